use url::form_urlencoded;

use super::uri::PROTOCOL_PREFIX;

pub const SHARE_FLAG_PARAM: &str = "share-target";
pub const URL_PARAM: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A transfer is staged in the transfer cache.
    Share { url: Option<String> },
    /// A custom-scheme URL with no share flag.
    Protocol { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchParams {
    pub share: bool,
    pub url: Option<String>,
    others: Vec<(String, String)>,
}

impl LaunchParams {
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                SHARE_FLAG_PARAM => {
                    params.share = !matches!(value.as_ref(), "0" | "false");
                }
                URL_PARAM => {
                    params.url = Some(restore_scheme_plus(value.trim())).filter(|v| !v.is_empty());
                }
                _ => params.others.push((key.into_owned(), value.into_owned())),
            }
        }
        params
    }

    pub fn activation(&self) -> Option<Activation> {
        if self.share {
            return Some(Activation::Share {
                url: self.url.clone(),
            });
        }
        self.url.as_ref().map(|url| Activation::Protocol { url: url.clone() })
    }

    /// The launch query without activation markers, so a reload does not
    /// process the same activation again.
    pub fn scrubbed_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.others {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

// Unescaped `+` in a query decodes to a space.
fn restore_scheme_plus(value: &str) -> String {
    let spaced = PROTOCOL_PREFIX.replacen('+', " ", 1);
    match value.strip_prefix(spaced.as_str()) {
        Some(rest) => format!("{PROTOCOL_PREFIX}{rest}"),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Activation, LaunchParams};

    #[test]
    fn share_flag_with_encoded_url() {
        let params = LaunchParams::parse("?share-target=1&url=web%2Bwami%3A%2F%2Fblur");
        assert_eq!(
            params.activation(),
            Some(Activation::Share {
                url: Some("web+wami://blur".to_string())
            })
        );
    }

    #[test]
    fn protocol_only_activation() {
        let params = LaunchParams::parse("url=web+wami://resize/250");
        assert_eq!(
            params.activation(),
            Some(Activation::Protocol {
                url: "web+wami://resize/250".to_string()
            })
        );
    }

    #[test]
    fn no_markers_means_no_activation() {
        assert_eq!(LaunchParams::parse("").activation(), None);
        assert_eq!(LaunchParams::parse("share-target=0&tab=flows").activation(), None);
    }

    #[test]
    fn scrub_keeps_unrelated_params() {
        let params = LaunchParams::parse("?tab=flows&share-target=1&url=web%2Bwami%3A%2F%2Fflip&x=a+b");
        assert_eq!(params.scrubbed_query(), "tab=flows&x=a+b");
    }
}

use std::time::Duration;

use tracing::{debug, info, warn};
use wami_contracts::config::WamiConfig;
use wami_contracts::flows::{upsert_by_name, Flow, FlowStore};
use wami_contracts::intent::{
    is_protocol_url, parse_protocol_url, Activation, LaunchParams, ResolvedIntent,
    DEFAULT_RESIZE_WIDTH,
};
use wami_contracts::share::{ShareManifest, TransferCache, TransferLease};
use wami_contracts::{Result, WamiError};

use crate::provenance::{self, SourceDescriptor};
use crate::session::{AutoRunHandle, Session};

/// What one activation turned into.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The flow navigated to, if resolution got that far.
    pub flow: Option<Flow>,
    pub created: bool,
    pub images: usize,
    pub auto_run: Option<AutoRunHandle>,
    /// Launch query with the activation markers removed.
    pub scrubbed_query: String,
    /// Why processing stopped early. Cleanup and scrubbing still happened.
    pub error: Option<WamiError>,
}

/// Maps share transfers and `web+wami://` activations onto a persisted flow,
/// an input batch and an optional automatic run.
pub struct IntentResolver<'a> {
    store: &'a dyn FlowStore,
    session: &'a Session,
    config: &'a WamiConfig,
}

impl<'a> IntentResolver<'a> {
    pub fn new(store: &'a dyn FlowStore, session: &'a Session, config: &'a WamiConfig) -> Self {
        Self {
            store,
            session,
            config,
        }
    }

    /// `None` when the launch carries no activation. Otherwise failures are
    /// logged and reported on the resolution, never returned.
    pub fn resolve(
        &self,
        params: &LaunchParams,
        cache: &mut dyn TransferCache,
    ) -> Option<Resolution> {
        let activation = params.activation()?;
        let mut resolution = Resolution {
            scrubbed_query: params.scrubbed_query(),
            ..Resolution::default()
        };

        let outcome = match &activation {
            Activation::Share { url } => self.resolve_share(url.as_deref(), cache, &mut resolution),
            Activation::Protocol { url } => self.resolve_protocol(url, &mut resolution),
        };
        if let Err(err) = outcome {
            warn!(error = %err, "activation aborted");
            self.session.observer().activation_failed(&err);
            resolution.error = Some(err);
        }

        self.session
            .observer()
            .activation_scrubbed(&resolution.scrubbed_query);
        Some(resolution)
    }

    fn resize_width(&self) -> i64 {
        if self.config.default_resize_width > 0 {
            self.config.default_resize_width
        } else {
            DEFAULT_RESIZE_WIDTH
        }
    }

    fn resolve_protocol(&self, url: &str, resolution: &mut Resolution) -> Result<()> {
        if !is_protocol_url(url) {
            info!(url, "launch url is not a protocol activation");
            return Ok(());
        }
        let width = self.resize_width();
        let intent = parse_protocol_url(url, width)
            .unwrap_or_else(|| ResolvedIntent::share_default(None, width));
        self.navigate(intent, resolution)
    }

    fn resolve_share(
        &self,
        launch_url: Option<&str>,
        cache: &mut dyn TransferCache,
        resolution: &mut Resolution,
    ) -> Result<()> {
        let Some(mut lease) = TransferLease::open(cache)? else {
            info!("share activation without a staged transfer");
            return Ok(());
        };
        let ingested = self.ingest(&mut lease, launch_url, resolution);
        let released = lease.release();
        ingested?;
        let removed = released?;
        debug!(removed, "share transfer consumed");
        Ok(())
    }

    fn ingest(
        &self,
        lease: &mut TransferLease<'_>,
        launch_url: Option<&str>,
        resolution: &mut Resolution,
    ) -> Result<()> {
        let manifest = lease.manifest()?.clone();
        if manifest.file_count <= 0 {
            info!(file_count = manifest.file_count, "share transfer holds no files");
            return Ok(());
        }

        let intent = self.share_intent(&manifest, launch_url);
        self.navigate(intent, resolution)?;

        // A declared count beyond the staged blobs fails on the first gap.
        let mut images = Vec::new();
        for index in 0..manifest.blob_count() {
            let blob = lease.read_blob(index)?;
            let name = manifest.file_name(index, &blob.content_type);
            images.push(provenance::load(SourceDescriptor::Shared {
                name,
                bytes: blob.bytes,
            })?);
        }

        resolution.images = images.len();
        let loaded = !images.is_empty();
        self.session.set_inputs(images);
        if loaded && self.config.auto_process_shares {
            let delay = Duration::from_millis(self.config.auto_run_delay_ms);
            resolution.auto_run = self.session.schedule_auto_run(delay);
        }
        Ok(())
    }

    /// Launch url first, then the manifest's; the first protocol url that
    /// parses wins over the share defaults.
    fn share_intent(&self, manifest: &ShareManifest, launch_url: Option<&str>) -> ResolvedIntent {
        let width = self.resize_width();
        [launch_url, manifest.url.as_deref()]
            .into_iter()
            .flatten()
            .find(|url| is_protocol_url(url))
            .and_then(|url| parse_protocol_url(url, width))
            .unwrap_or_else(|| ResolvedIntent::share_default(manifest.title.as_deref(), width))
    }

    fn navigate(&self, intent: ResolvedIntent, resolution: &mut Resolution) -> Result<()> {
        let (flow, created) = upsert_by_name(self.store, &intent.title, intent.steps)?;
        info!(flow = %flow.name, created, "activation resolved");
        self.session.select_flow(flow.clone());
        resolution.flow = Some(flow);
        resolution.created = created;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wami_contracts::config::WamiConfig;
    use wami_contracts::flows::{create_flow, FlowStore, MemoryFlowStore, Step, StepParam};
    use wami_contracts::intent::LaunchParams;
    use wami_contracts::share::{stage_transfer, CachedBlob, FileTransferCache, ShareManifest};

    use super::IntentResolver;
    use crate::flow_engine::DryrunEngine;
    use crate::observer::NullObserver;
    use crate::session::Session;

    fn quiet_config() -> WamiConfig {
        WamiConfig {
            auto_process_shares: false,
            ..WamiConfig::default()
        }
    }

    #[test]
    fn launch_without_markers_is_a_no_op() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut cache = FileTransferCache::new(temp.path().join("cache.json"));
        let store = MemoryFlowStore::default();
        let session = Session::new(Arc::new(DryrunEngine), Arc::new(NullObserver));
        let config = quiet_config();

        let resolver = IntentResolver::new(&store, &session, &config);
        assert!(resolver
            .resolve(&LaunchParams::parse("tab=flows"), &mut cache)
            .is_none());
        assert!(store.get_flows()?.is_empty());
        Ok(())
    }

    #[test]
    fn protocol_activation_reuses_the_flow_with_that_title() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut cache = FileTransferCache::new(temp.path().join("cache.json"));
        let store = MemoryFlowStore::default();
        create_flow(&store, "resize 250", vec![Step::new("blur", vec![StepParam::int(3)])])?;
        let session = Session::new(Arc::new(DryrunEngine), Arc::new(NullObserver));
        let config = quiet_config();
        let resolver = IntentResolver::new(&store, &session, &config);

        let params = LaunchParams::parse("url=web%2Bwami%3A%2F%2Fresize%2F250&tab=x");
        let resolution = resolver.resolve(&params, &mut cache).expect("activation");
        assert!(resolution.error.is_none());
        assert!(!resolution.created);
        assert_eq!(resolution.scrubbed_query, "tab=x");
        assert!(resolution.auto_run.is_none());

        let flows = store.get_flows()?;
        assert_eq!(flows.len(), 1);
        assert_eq!(
            serde_json::to_value(&flows[0].steps)?,
            json!([{"type": "resize-width-if-larger", "params": [250]}])
        );
        assert_eq!(session.current_flow(), Some(flows[0].clone()));
        Ok(())
    }

    #[test]
    fn zero_file_manifest_is_consumed_without_a_flow() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut cache = FileTransferCache::new(temp.path().join("cache.json"));
        let manifest = ShareManifest {
            file_count: 0,
            file_names: None,
            title: Some("Empty".to_string()),
            url: None,
        };
        stage_transfer(&mut cache, &manifest, &[])?;
        let store = MemoryFlowStore::default();
        let session = Session::new(Arc::new(DryrunEngine), Arc::new(NullObserver));
        let config = quiet_config();
        let resolver = IntentResolver::new(&store, &session, &config);

        let resolution = resolver
            .resolve(&LaunchParams::parse("share-target=1"), &mut cache)
            .expect("activation");
        assert!(resolution.flow.is_none());
        assert!(store.get_flows()?.is_empty());
        assert!(wami_contracts::share::TransferLease::open(&mut cache)?.is_none());
        Ok(())
    }

    #[test]
    fn launch_url_outranks_manifest_url() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut cache = FileTransferCache::new(temp.path().join("cache.json"));
        let manifest = ShareManifest {
            file_count: 1,
            file_names: None,
            title: None,
            url: Some("web+wami://flip".to_string()),
        };
        stage_transfer(&mut cache, &manifest, &[CachedBlob::new("image/webp", vec![1])])?;
        let store = MemoryFlowStore::default();
        let session = Session::new(Arc::new(DryrunEngine), Arc::new(NullObserver));
        let config = quiet_config();
        let resolver = IntentResolver::new(&store, &session, &config);

        let params = LaunchParams::parse("share-target=1&url=web%2Bwami%3A%2F%2Fsepia");
        let resolution = resolver.resolve(&params, &mut cache).expect("activation");
        let flow = resolution.flow.expect("flow");
        assert_eq!(flow.name, "sepia");
        assert_eq!(flow.steps[0].kind, "sepia-tone");
        assert_eq!(resolution.images, 1);
        assert_eq!(session.inputs()[0].file.name, "shared-1.webp");
        Ok(())
    }
}

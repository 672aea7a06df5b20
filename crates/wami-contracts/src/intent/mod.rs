mod command_registry;
mod launch;
mod uri;

pub use command_registry::{PROTOCOL_HELP_COMMANDS, RESIZE_STEP_TYPE};
pub use launch::{Activation, LaunchParams, SHARE_FLAG_PARAM, URL_PARAM};
pub use uri::{
    is_protocol_url, parse_protocol_url, ResolvedIntent, DEFAULT_RESIZE_WIDTH,
    DEFAULT_SHARE_TITLE, PROTOCOL_PREFIX,
};

use crate::flows::{Step, StepParam};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParamTemplate {
    Empty,
    Fixed(i64),
    /// Width taken from the second path segment.
    Width,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub keyword: &'static str,
    pub step_type: &'static str,
    pub params: ParamTemplate,
}

impl CommandSpec {
    pub fn matches(&self, command: &str) -> bool {
        command.contains(self.keyword)
    }

    pub fn build(&self, width: i64) -> Step {
        let params = match self.params {
            ParamTemplate::Empty => Vec::new(),
            ParamTemplate::Fixed(value) => vec![StepParam::int(value)],
            ParamTemplate::Width => vec![StepParam::int(width)],
        };
        Step::new(self.step_type, params)
    }
}

pub const RESIZE_STEP_TYPE: &str = "resize-width-if-larger";

/// Evaluated top to bottom; the first keyword contained in the command wins.
pub(crate) const PROTOCOL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        keyword: "rotate",
        step_type: "rotate",
        params: ParamTemplate::Fixed(90),
    },
    CommandSpec {
        keyword: "flip",
        step_type: "flip",
        params: ParamTemplate::Empty,
    },
    CommandSpec {
        keyword: "paint",
        step_type: "paint",
        params: ParamTemplate::Fixed(5),
    },
    CommandSpec {
        keyword: "sepia",
        step_type: "sepia-tone",
        params: ParamTemplate::Fixed(80),
    },
    CommandSpec {
        keyword: "blur",
        step_type: "blur",
        params: ParamTemplate::Fixed(3),
    },
    CommandSpec {
        keyword: "negate",
        step_type: "negate",
        params: ParamTemplate::Empty,
    },
    CommandSpec {
        keyword: "resize",
        step_type: RESIZE_STEP_TYPE,
        params: ParamTemplate::Width,
    },
];

pub(crate) const FALLBACK_COMMAND: CommandSpec = CommandSpec {
    keyword: "",
    step_type: RESIZE_STEP_TYPE,
    params: ParamTemplate::Width,
};

pub const PROTOCOL_HELP_COMMANDS: &[&str] = &[
    "rotate",
    "flip",
    "paint",
    "sepia",
    "blur",
    "negate",
    "resize[/<width>]",
];

pub(crate) fn lookup(command: &str) -> &'static CommandSpec {
    PROTOCOL_COMMANDS
        .iter()
        .find(|spec| spec.matches(command))
        .unwrap_or(&FALLBACK_COMMAND)
}

#[cfg(test)]
mod tests {
    use super::{lookup, ParamTemplate, RESIZE_STEP_TYPE};

    #[test]
    fn earlier_rows_win_ties() {
        assert_eq!(lookup("rotate-and-flip").step_type, "rotate");
        assert_eq!(lookup("flip-then-rotate").step_type, "rotate");
        assert_eq!(lookup("unflipped").step_type, "flip");
    }

    #[test]
    fn unknown_commands_fall_back_to_resize() {
        let spec = lookup("unknown-command");
        assert_eq!(spec.step_type, RESIZE_STEP_TYPE);
        assert_eq!(spec.params, ParamTemplate::Width);
    }
}

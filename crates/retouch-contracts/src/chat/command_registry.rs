#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text argument.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mode",
        action: "select_mode",
    },
    CommandSpec {
        command: "style",
        action: "set_style",
    },
    CommandSpec {
        command: "param",
        action: "set_parameter",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "undo",
        action: "undo",
    },
    CommandSpec {
        command: "redo",
        action: "redo",
    },
    CommandSpec {
        command: "clear",
        action: "clear_all",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "modes",
        action: "list_modes",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/mode <mode>",
    "/style <style>",
    "/param <text>",
    "/generate",
    "/undo",
    "/redo",
    "/clear",
    "/download [path]",
    "/status",
    "/modes",
    "/help",
];

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    RemoveBackground,
    Stylize,
    ChangeDress,
    RemoveObject,
    AddBackground,
    ChangePose,
    AddObject,
    Upscale,
}

#[derive(Clone, Copy, Debug)]
struct ModeSpec {
    mode: EditMode,
    slug: &'static str,
    label: &'static str,
    requires_text: bool,
    missing_hint: &'static str,
}

const MODE_SPECS: &[ModeSpec] = &[
    ModeSpec {
        mode: EditMode::RemoveBackground,
        slug: "remove_background",
        label: "Remove Background",
        requires_text: false,
        missing_hint: "",
    },
    ModeSpec {
        mode: EditMode::Stylize,
        slug: "stylize",
        label: "Stylize",
        requires_text: false,
        missing_hint: "Please choose a style.",
    },
    ModeSpec {
        mode: EditMode::ChangeDress,
        slug: "change_dress",
        label: "Change Dress",
        requires_text: true,
        missing_hint: "Please describe the new outfit.",
    },
    ModeSpec {
        mode: EditMode::RemoveObject,
        slug: "remove_object",
        label: "Remove Object",
        requires_text: true,
        missing_hint: "Please describe the object to remove.",
    },
    ModeSpec {
        mode: EditMode::AddBackground,
        slug: "add_background",
        label: "Add Background",
        requires_text: true,
        missing_hint: "Please describe the background to add.",
    },
    ModeSpec {
        mode: EditMode::ChangePose,
        slug: "change_pose",
        label: "Change Pose",
        requires_text: true,
        missing_hint: "Please describe the new pose.",
    },
    ModeSpec {
        mode: EditMode::AddObject,
        slug: "add_object",
        label: "Add Object",
        requires_text: true,
        missing_hint: "Please describe the object to add.",
    },
    ModeSpec {
        mode: EditMode::Upscale,
        slug: "upscale",
        label: "Upscale",
        requires_text: false,
        missing_hint: "",
    },
];

impl EditMode {
    pub const ALL: [EditMode; 8] = [
        EditMode::RemoveBackground,
        EditMode::Stylize,
        EditMode::ChangeDress,
        EditMode::RemoveObject,
        EditMode::AddBackground,
        EditMode::ChangePose,
        EditMode::AddObject,
        EditMode::Upscale,
    ];

    fn spec(self) -> &'static ModeSpec {
        // MODE_SPECS lists every variant in declaration order.
        &MODE_SPECS[self as usize]
    }

    pub fn slug(self) -> &'static str {
        self.spec().slug
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    /// Modes whose instruction embeds a free-text description from the user.
    pub fn requires_text(self) -> bool {
        self.spec().requires_text
    }

    pub fn missing_parameter_hint(self) -> &'static str {
        self.spec().missing_hint
    }

    /// Accepts the slug, the label, or the label with `-`/`_` separators.
    pub fn parse(raw: &str) -> Option<EditMode> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        if normalized.is_empty() {
            return None;
        }
        MODE_SPECS
            .iter()
            .find(|spec| spec.slug == normalized)
            .map(|spec| spec.mode)
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleOption {
    NinetiesLook,
    #[default]
    Vintage,
    Polaroid,
    NinetiesBollywood,
    Cyberpunk,
    FantasyArt,
    Watercolor,
    Steampunk,
}

impl StyleOption {
    pub const ALL: [StyleOption; 8] = [
        StyleOption::NinetiesLook,
        StyleOption::Vintage,
        StyleOption::Polaroid,
        StyleOption::NinetiesBollywood,
        StyleOption::Cyberpunk,
        StyleOption::FantasyArt,
        StyleOption::Watercolor,
        StyleOption::Steampunk,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StyleOption::NinetiesLook => "90s look",
            StyleOption::Vintage => "Vintage",
            StyleOption::Polaroid => "Polaroid",
            StyleOption::NinetiesBollywood => "90s Bollywood",
            StyleOption::Cyberpunk => "Cyberpunk",
            StyleOption::FantasyArt => "Fantasy Art",
            StyleOption::Watercolor => "Watercolor",
            StyleOption::Steampunk => "Steampunk",
        }
    }

    /// Case-insensitive match on the label; `_` and `-` count as spaces.
    pub fn parse(raw: &str) -> Option<StyleOption> {
        let normalized = raw
            .trim()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.label().to_ascii_lowercase() == normalized)
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.into_iter().map(StyleOption::label).collect()
    }
}

impl fmt::Display for StyleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

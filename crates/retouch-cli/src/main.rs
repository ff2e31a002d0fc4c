use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use retouch_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use retouch_contracts::codec::{self, ImageFile};
use retouch_contracts::modes::{EditMode, StyleOption};
use retouch_engine::{
    DryrunEditor, EditSession, EditorConfig, GeminiEditor, ImageEditor, SessionSnapshot,
};

#[derive(Debug, Parser)]
#[command(name = "retouch", version, about = "AI photo retouching from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session with undo/redo.
    Chat(ChatArgs),
    /// Apply a single edit and write the result.
    Edit(EditArgs),
    /// List edit modes and styles.
    Modes,
}

#[derive(Debug, Args)]
struct EditorArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    /// Seconds; clamped to 15..=300.
    #[arg(long)]
    request_timeout: Option<f64>,
    /// Offline editor that needs no credentials.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    editor: EditorArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "remove_background")]
    mode: String,
    #[arg(long)]
    param: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    editor: EditorArgs,
}

const DEFAULT_DOWNLOAD_STEM: &str = "edited-image";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Edit(args) => run_edit(args),
        Command::Modes => {
            print!("{}", modes_listing());
            Ok(0)
        }
    }
}

fn build_editor(args: &EditorArgs) -> Box<dyn ImageEditor> {
    if args.dryrun {
        return Box::new(DryrunEditor::default());
    }
    let mut config = EditorConfig::from_env();
    if let Some(model) = args.model.as_deref() {
        config = config.with_model(model);
    }
    if let Some(api_base) = args.api_base.as_deref() {
        config = config.with_api_base(api_base);
    }
    if let Some(seconds) = args.request_timeout.filter(|value| value.is_finite() && *value > 0.0) {
        config = config.with_request_timeout(Duration::from_secs_f64(seconds));
    }
    if !config.has_api_key() {
        eprintln!(
            "warning: GEMINI_API_KEY is not set; edits will fail until it is configured (or use --dryrun)."
        );
    }
    Box::new(GeminiEditor::new(config))
}

fn new_session(events: Option<&Path>) -> EditSession {
    match events {
        Some(path) => EditSession::with_event_log(path),
        None => EditSession::new(),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let editor = build_editor(&args.editor);
    let mut session = new_session(args.events.as_deref());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "Retouch chat started ({} editor). Type /help for commands.",
        editor.name()
    )?;
    if let Some(path) = args.image.as_deref() {
        upload_file(&mut session, path, &mut out)?;
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        handle_intent(&mut session, editor.as_ref(), &intent, &mut out)?;
    }
    Ok(())
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let Some(mode) = EditMode::parse(&args.mode) else {
        bail!("unknown mode '{}'\n{}", args.mode, modes_listing());
    };
    let editor = build_editor(&args.editor);
    let mut session = new_session(args.events.as_deref());

    let file = ImageFile::load(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    session
        .upload(file)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    session.select_mode(mode);
    if let Some(param) = args.param {
        session.set_parameter(mode, param);
    }

    if let Err(err) = session.generate(editor.as_ref()) {
        eprintln!("retouch error: {err}");
        return Ok(1);
    }
    let written = save_current(&session, &args.out)?;
    println!("Saved {} ({written} bytes)", args.out.display());
    Ok(0)
}

/// Applies one chat intent to the session and reports on `out`.
fn handle_intent(
    session: &mut EditSession,
    editor: &dyn ImageEditor,
    intent: &Intent,
    out: &mut dyn Write,
) -> Result<()> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join("  "))?;
            writeln!(
                out,
                "Any other text sets the active mode's description and generates."
            )?;
        }
        "list_modes" => write!(out, "{}", modes_listing())?,
        "status" => {
            writeln!(out, "{}", serde_json::to_string_pretty(&session.snapshot())?)?;
        }
        "upload" => {
            let path = intent.arg_str("path").unwrap_or_default();
            if path.is_empty() {
                writeln!(out, "/upload requires a path")?;
                return Ok(());
            }
            upload_file(session, Path::new(path), out)?;
        }
        "select_mode" => {
            let raw = intent.arg_str("mode").unwrap_or_default();
            match EditMode::parse(raw) {
                Some(mode) => {
                    session.select_mode(mode);
                    writeln!(out, "Mode set to {mode}")?;
                    if let Some(hint) = parameter_prompt(mode) {
                        writeln!(out, "{hint}")?;
                    }
                }
                None => writeln!(out, "Unknown mode '{raw}'. Try /modes")?,
            }
        }
        "set_style" => {
            let raw = intent.arg_str("style").unwrap_or_default();
            match StyleOption::parse(raw) {
                Some(style) => {
                    session.set_parameter(EditMode::Stylize, style.label());
                    writeln!(out, "Style set to {style}")?;
                }
                None => {
                    session.set_parameter(EditMode::Stylize, raw);
                    writeln!(
                        out,
                        "Unrecognised style '{raw}'. Styles: {}",
                        StyleOption::labels().join(", ")
                    )?;
                }
            }
        }
        "set_parameter" => {
            let mode = session.active_mode();
            let text = intent.arg_str("text").unwrap_or_default();
            session.set_parameter(mode, text);
            writeln!(out, "{mode}: \"{}\"", text.trim())?;
        }
        "generate" => {
            if let Some(text) = intent.prompt.as_deref() {
                let mode = session.active_mode();
                if mode.requires_text() || mode == EditMode::Stylize {
                    session.set_parameter(mode, text);
                } else {
                    writeln!(out, "{mode} takes no description; ignoring \"{text}\"")?;
                }
            }
            generate(session, editor, out)?;
        }
        "undo" => {
            if session.undo() {
                writeln!(out, "{}", status_line(&session.snapshot()))?;
            } else {
                writeln!(out, "Nothing to undo")?;
            }
        }
        "redo" => {
            if session.redo() {
                writeln!(out, "{}", status_line(&session.snapshot()))?;
            } else {
                writeln!(out, "Nothing to redo")?;
            }
        }
        "clear_all" => {
            session.clear_all();
            writeln!(out, "Cleared. Upload an image to start.")?;
        }
        "download" => {
            let requested = intent.arg_str("path").unwrap_or_default();
            if session.history().current().is_none() {
                writeln!(out, "Nothing to download yet; generate an edit first")?;
                return Ok(());
            }
            let path = download_path(session, requested);
            match save_current(session, &path) {
                Ok(written) => writeln!(out, "Saved {} ({written} bytes)", path.display())?,
                Err(err) => writeln!(out, "Download failed: {err:#}")?,
            }
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            writeln!(out, "Unknown command /{command}. Type /help")?;
        }
        other => writeln!(out, "Unhandled action {other}")?,
    }
    Ok(())
}

fn upload_file(session: &mut EditSession, path: &Path, out: &mut dyn Write) -> Result<()> {
    let loaded = ImageFile::load(path).and_then(|file| {
        let summary = format!("Loaded {} ({})", file.name, file.mime_type);
        session.upload(file)?;
        Ok(summary)
    });
    match loaded {
        Ok(summary) => {
            writeln!(out, "{summary}")?;
            writeln!(out, "{}", status_line(&session.snapshot()))?;
        }
        Err(err) => writeln!(out, "Upload failed: {err}")?,
    }
    Ok(())
}

fn generate(session: &mut EditSession, editor: &dyn ImageEditor, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Generating ({})…", session.active_mode())?;
    out.flush()?;
    match session.generate(editor) {
        Ok(image) => {
            let (bytes, mime) = codec::decode(image)?;
            writeln!(out, "Done: {} bytes ({mime})", bytes.len())?;
        }
        Err(err) => writeln!(out, "Error: {err}")?,
    }
    writeln!(out, "{}", status_line(&session.snapshot()))?;
    Ok(())
}

fn save_current(session: &EditSession, path: &Path) -> Result<usize> {
    let Some(file) = session.current_image_file() else {
        bail!("no image to save");
    };
    file.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn download_path(session: &EditSession, requested: &str) -> PathBuf {
    if !requested.trim().is_empty() {
        return PathBuf::from(requested.trim());
    }
    let ext = session
        .current_image_file()
        .map(|file| codec::extension_for_mime(&file.mime_type))
        .unwrap_or("png");
    PathBuf::from(format!("{DEFAULT_DOWNLOAD_STEM}.{ext}"))
}

fn parameter_prompt(mode: EditMode) -> Option<String> {
    match mode {
        EditMode::Stylize => Some(format!(
            "Choose a style with /style: {}",
            StyleOption::labels().join(", ")
        )),
        EditMode::ChangeDress => Some("Describe the new outfit, e.g. 'a stylish red leather jacket'".to_string()),
        EditMode::RemoveObject => Some("Object to remove, e.g. 'the red car'".to_string()),
        EditMode::AddBackground => Some("Describe the background, e.g. 'a futuristic cityscape at night'".to_string()),
        EditMode::ChangePose => Some("Describe the new pose, e.g. 'standing with arms crossed'".to_string()),
        EditMode::AddObject => Some("Describe the object to add, e.g. 'a small cat sitting on the couch'".to_string()),
        EditMode::Upscale => Some("Enhance to 4K: /generate to upscale the current image".to_string()),
        EditMode::RemoveBackground => None,
    }
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    let position = if snapshot.history_len == 0 {
        "none".to_string()
    } else {
        format!("{}/{}", snapshot.history_index + 1, snapshot.history_len)
    };
    let mut line = format!(
        "[{}] edits {} | undo {} | redo {}",
        snapshot.active_mode,
        position,
        yes_no(snapshot.can_undo),
        yes_no(snapshot.can_redo),
    );
    if let Some(error) = snapshot.error.as_deref() {
        line.push_str(&format!(" | error: {error}"));
    }
    line
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn modes_listing() -> String {
    let mut text = String::from("Modes:\n");
    for mode in EditMode::ALL {
        let needs = if mode.requires_text() {
            " (needs a description)"
        } else {
            ""
        };
        text.push_str(&format!("  {:<18} {}{}\n", mode.slug(), mode.label(), needs));
    }
    text.push_str(&format!("Styles: {}\n", StyleOption::labels().join(", ")));
    text
}

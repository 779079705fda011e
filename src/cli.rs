// ============================================================================
// EditFE CLI — headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   editfe -i photo.png -o out.jpg --brightness 120 --sepia 40
//   editfe -i "shots/*.jpg" --output-dir processed/ --format png --rotate 90
//   editfe -i photo.png --actions edits.json -o annotated.png
//
// Adjustment flags take the same units as `set_adjustment` actions: percent
// for brightness/contrast/saturation (100 = unchanged) and for
// sepia/grayscale/invert (0-100), pixels for blur, degrees for hue.
//
// Every input gets its own editor session: the file becomes the base layer,
// the flag adjustments are applied, then the action file (a JSON array of
// editor actions) is replayed through dispatch before the composite is
// exported.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::adjust::Adjustment;
use crate::compositor::Compositor;
use crate::editor::{Action, Editor};
use crate::error::{EditorError, Result};
use crate::io::ExportFormat;
use crate::layer::LayerId;
use crate::settings::EditorSettings;
use crate::text::{FontLibrary, FontProvider};
use crate::{log_err, log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// EditFE headless image editor.
#[derive(Parser, Debug)]
#[command(
    name = "editfe",
    about = "EditFE headless layered image editor",
    long_about = "Apply adjustments, transforms and recorded editor actions to image files\n\
                  without a display. Reads anything the image decoder understands\n\
                  (PNG, JPEG, WEBP, BMP, TGA) and writes PNG, JPEG, BMP or TGA.\n\n\
                  Example:\n  \
                  editfe --input photo.png --contrast 130 --output result.png\n  \
                  editfe -i *.jpg --actions watermark.json --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Brightness percent, 0-200 (100 = unchanged).
    #[arg(long)]
    pub brightness: Option<f32>,

    /// Contrast percent, 0-200 (100 = unchanged).
    #[arg(long)]
    pub contrast: Option<f32>,

    /// Saturation percent, 0-200 (100 = unchanged, 0 = grey).
    #[arg(long)]
    pub saturation: Option<f32>,

    /// Gaussian blur radius in pixels, up to the configured maximum.
    #[arg(long)]
    pub blur: Option<f32>,

    /// Hue rotation in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub hue: Option<f32>,

    /// Sepia percent (0-100).
    #[arg(long)]
    pub sepia: Option<f32>,

    /// Grayscale percent (0-100).
    #[arg(long)]
    pub grayscale: Option<f32>,

    /// Invert percent (0-100; 100 = full negative).
    #[arg(long)]
    pub invert: Option<f32>,

    /// Rotate the base image by this many degrees (clockwise).
    #[arg(long, allow_negative_numbers = true)]
    pub rotate: Option<i32>,

    /// Mirror the base image horizontally.
    #[arg(long)]
    pub flip_x: bool,

    /// Mirror the base image vertically.
    #[arg(long)]
    pub flip_y: bool,

    /// JSON file holding an array of editor actions to replay on every input.
    #[arg(long, value_name = "FILE.json")]
    pub actions: Option<PathBuf>,

    /// Mirror the session log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Flag adjustments and transforms as editor actions, in pipeline order.
    pub fn preset_actions(&self) -> Vec<Action> {
        let flags = [
            (Adjustment::Brightness, self.brightness),
            (Adjustment::Contrast, self.contrast),
            (Adjustment::Saturation, self.saturation),
            (Adjustment::Sepia, self.sepia),
            (Adjustment::Blur, self.blur),
            (Adjustment::HueRotate, self.hue),
            (Adjustment::Grayscale, self.grayscale),
            (Adjustment::Invert, self.invert),
        ];
        let mut actions: Vec<Action> = flags
            .into_iter()
            .filter_map(|(adjustment, value)| value.map(|value| Action::SetAdjustment { adjustment, value }))
            .collect();

        if self.rotate.is_some() || self.flip_x || self.flip_y {
            actions.push(Action::UpdateTransform {
                rotate: self.rotate,
                flip_x: Some(self.flip_x),
                flip_y: Some(self.flip_y),
            });
        }
        actions
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files (or the setup) failed.
pub fn run(args: CliArgs, settings: EditorSettings) -> ExitCode {
    match run_batch(&args, &settings) {
        Ok(report) if report.failed.is_empty() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(msg) => {
            eprintln!("error: {}", msg);
            log_err!("CLI: {}", msg);
            ExitCode::FAILURE
        }
    }
}

/// Process every input.  `Err` only for problems that stop the whole batch
/// (bad arguments, unreadable action file); per-file failures are reported.
pub fn run_batch(args: &CliArgs, settings: &EditorSettings) -> std::result::Result<BatchReport, String> {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return Err("no input files matched the given pattern(s).".to_string());
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        return Err(format!(
            "{} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        ));
    }

    let format = resolve_format(args.format.as_deref(), args.output.as_deref())?;

    let mut actions = args.preset_actions();
    if let Some(path) = &args.actions {
        let replay = load_actions(path)
            .map_err(|e| format!("could not read actions '{}': {}", path.display(), e))?;
        actions.extend(replay);
    }

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("could not create output directory '{}': {}", dir.display(), e))?;
    }

    let fonts: Arc<dyn FontProvider> = Arc::new(FontLibrary::system(&settings.font_dirs));
    let total = inputs.len();
    let multi = total > 1;
    let mut report = BatchReport::default();

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            let msg = format!("cannot determine output path for '{}'", input_path.display());
            eprintln!("  error: {}", msg);
            report.failed.push((input_path.clone(), msg));
            continue;
        };

        let mut editor = Editor::with_compositor(settings.clone(), Compositor::new(fonts.clone()));
        match run_one(&mut editor, input_path, &output_path, &actions, format, args.quality) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                report.succeeded.push(output_path);
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log_err!("CLI: {} failed: {}", input_path.display(), e);
                report.failed.push((input_path.clone(), e.to_string()));
            }
        }
    }

    log_info!("CLI: {} succeeded, {} failed", report.succeeded.len(), report.failed.len());
    Ok(report)
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    editor: &mut Editor,
    input: &Path,
    output: &Path,
    actions: &[Action],
    format: ExportFormat,
    quality: u8,
) -> Result<()> {
    // -- Step 1: Load ----------------------------------------------------
    editor.open_path(input);
    editor.wait_for_decodes();
    if editor.canvas_size() == (0, 0) {
        let base = LayerId::base();
        let out = editor.render();
        return Err(out
            .failed_layers
            .into_iter()
            .find(|e| matches!(e, EditorError::Decode { layer, .. } if *layer == base))
            .unwrap_or_else(|| EditorError::UnsupportedFormat(input.display().to_string())));
    }

    // -- Step 2: Replay actions ------------------------------------------
    let mut rejected = 0;
    for action in actions {
        if let Err(e) = editor.dispatch(action.clone()) {
            if !e.is_recoverable() {
                return Err(e);
            }
            rejected += 1;
        }
    }
    if rejected > 0 {
        log_warn!("CLI: {} of {} actions rejected for {}", rejected, actions.len(), input.display());
    }
    editor.wait_for_decodes();

    // -- Step 3: Export --------------------------------------------------
    editor.export_to_path(output, format, quality)
}

// ============================================================================
// Helpers
// ============================================================================

pub fn load_actions(path: &Path) -> Result<Vec<Action>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Literal paths and glob matches, in argument order, without duplicates.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut inputs = Vec::new();
    let mut keep = |path: PathBuf| {
        if seen.insert(path.clone()) {
            inputs.push(path);
        }
    };

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.exists() {
            keep(literal);
            continue;
        }
        let matches: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(paths) => paths.flatten().collect(),
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
                log_warn!("CLI: invalid glob '{}': {}", pattern, e);
                continue;
            }
        };
        if matches.is_empty() {
            eprintln!("warning: pattern '{}' matched no files.", pattern);
            log_warn!("CLI: pattern '{}' matched no files", pattern);
        }
        matches.into_iter().for_each(&mut keep);
    }
    inputs
}

/// Choose the format from `--format` or infer it from the output file
/// extension.  PNG when neither says otherwise.
fn resolve_format(format_arg: Option<&str>, output: Option<&Path>) -> std::result::Result<ExportFormat, String> {
    if let Some(f) = format_arg {
        return f.parse();
    }
    Ok(output.and_then(ExportFormat::from_path).unwrap_or_default())
}

/// Where one input's result goes: `--output` verbatim, else
/// `<output-dir>/<stem>.<ext>`, else next to the input (suffixed `_out` when
/// that would be the input itself).
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: ExportFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy();
    let file_name = |suffix: &str| format!("{stem}{suffix}.{}", format.extension());

    let dir = match output_dir {
        Some(dir) => return Some(dir.join(file_name(""))),
        None => input.parent().unwrap_or(Path::new(".")),
    };
    let beside = dir.join(file_name(""));
    Some(if beside == input { dir.join(file_name("_out")) } else { beside })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["editfe"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn write_png(path: &Path, color: [u8; 4]) {
        RgbaImage::from_pixel(8, 6, Rgba(color)).save(path).unwrap();
    }

    #[test]
    fn flags_become_actions_in_order() {
        let a = args(&["-i", "x.png", "--invert", "100", "--brightness", "150", "--rotate", "-90"]);
        let actions = a.preset_actions();
        assert_eq!(
            actions,
            vec![
                Action::SetAdjustment { adjustment: Adjustment::Brightness, value: 150.0 },
                Action::SetAdjustment { adjustment: Adjustment::Invert, value: 100.0 },
                Action::UpdateTransform { rotate: Some(-90), flip_x: Some(false), flip_y: Some(false) },
            ]
        );
    }

    #[test]
    fn format_resolution() {
        assert_eq!(resolve_format(Some("JPEG"), None), Ok(ExportFormat::Jpeg));
        assert_eq!(resolve_format(None, Some(Path::new("a/b.tga"))), Ok(ExportFormat::Tga));
        assert_eq!(resolve_format(None, Some(Path::new("a/b.xyz"))), Ok(ExportFormat::Png));
        assert!(resolve_format(Some("gif"), None).is_err());
    }

    #[test]
    fn output_path_avoids_overwriting_input() {
        let p = build_output_path(Path::new("dir/shot.png"), None, None, ExportFormat::Png).unwrap();
        assert_eq!(p, PathBuf::from("dir/shot_out.png"));
        let p = build_output_path(Path::new("dir/shot.png"), None, Some(Path::new("out")), ExportFormat::Jpeg)
            .unwrap();
        assert_eq!(p, PathBuf::from("out/shot.jpg"));
    }

    #[test]
    fn single_file_with_adjustments_and_actions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        let actions = dir.path().join("edits.json");
        write_png(&input, [200, 100, 50, 255]);
        std::fs::write(
            &actions,
            r##"[{"type": "place_shape", "shape": {"kind": "rectangle", "x": 5, "y": 3,
                 "width": 2, "height": 2, "color": "#0000ff", "stroke_width": 1}}]"##,
        )
        .unwrap();

        let a = args(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--invert",
            "100",
            "--flip-x",
            "--actions",
            actions.to_str().unwrap(),
        ]);
        let report = run_batch(&a, &EditorSettings::default()).unwrap();
        assert!(report.failed.is_empty(), "{:?}", report.failed);

        let out = image::open(&output).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (8, 6));
        assert_eq!(out.get_pixel(1, 1).0, [55, 155, 205, 255]);
        assert_ne!(out.get_pixel(5, 3).0, [55, 155, 205, 255]);
    }

    #[test]
    fn identity_percentages_leave_pixels_alone() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_png(&input, [200, 100, 50, 255]);

        let a = args(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--brightness",
            "100",
            "--contrast",
            "100",
            "--saturation",
            "100",
            "--sepia",
            "0",
        ]);
        run_batch(&a, &EditorSettings::default()).unwrap();
        let out = image::open(&output).unwrap().to_rgba8();
        assert_eq!(out.get_pixel(3, 3).0, [200, 100, 50, 255]);
    }

    #[test]
    fn batch_reports_undecodable_inputs() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("good.png"), [1, 2, 3, 255]);
        std::fs::write(dir.path().join("bad.png"), b"not an image").unwrap();
        let out_dir = dir.path().join("out");

        let pattern = dir.path().join("*.png");
        let a = args(&[
            "-i",
            pattern.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
            "--format",
            "bmp",
        ]);
        let report = run_batch(&a, &EditorSettings::default()).unwrap();
        assert_eq!(report.succeeded, vec![out_dir.join("good.bmp")]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("bad.png"));
    }

    #[test]
    fn malformed_action_file_stops_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        write_png(&input, [0, 0, 0, 255]);
        let actions = dir.path().join("edits.json");
        std::fs::write(&actions, "[{\"type\": \"warp_drive\"}]").unwrap();

        let a = args(&["-i", input.to_str().unwrap(), "--actions", actions.to_str().unwrap()]);
        assert!(run_batch(&a, &EditorSettings::default()).is_err());
    }
}

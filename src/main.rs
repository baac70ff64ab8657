//! forge – command-line print export.
//!
//! Usage:
//!   forge <scene.json> [output] [--format pdf] [--paper a4] [--bleed 3] [--crop-marks]
//!   forge --template card --rows guests.csv --tier business
//!
//! If `output` is omitted the artifact is written next to the input file
//! under its suggested name (e.g. `birthday_card.png`). With `--rows` one
//! export runs per row and the ZIP archive is written instead.

use std::{env, fs, path::Path, path::PathBuf, process};

use print_forge::gate::TierCapability;
use print_forge::merge::PersonalizationRow;
use print_forge::pipeline::{ExportOrchestrator, PipelineConfig};
use print_forge::request::{ColorProfile, ExportFormat, ExportRequest, PageSelection, QualityTier};
use print_forge::scene::SceneDocument;
use print_forge::surface::RenderContext;
use print_forge::templates;
use print_forge::units::{PageOrientation, PaperSize};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut template: Option<String> = None;
    let mut request_path: Option<PathBuf> = None;
    let mut rows_path: Option<PathBuf> = None;
    let mut tier = "free".to_string();
    let mut title: Option<String> = None;
    let mut watermark: Option<String> = None;
    let mut jpeg_quality: Option<u8> = None;

    let mut format: Option<ExportFormat> = None;
    let mut quality: Option<QualityTier> = None;
    let mut paper: Option<PaperSize> = None;
    let mut landscape = false;
    let mut bleed: Option<f64> = None;
    let mut crop_marks = false;
    let mut safe_zone = false;
    let mut transparent = false;
    let mut color: Option<ColorProfile> = None;
    let mut pages: Option<PageSelection> = None;
    let mut template_only_pages = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let mut value = |flag: &str| match iter.next() {
            Some(v) => v.clone(),
            None => {
                eprintln!("Error: {flag} needs a value.");
                process::exit(1);
            }
        };
        match flag {
            "--format" | "-f" => format = Some(parse_or_exit(&value(flag))),
            "--quality" | "-q" => quality = Some(parse_or_exit(&value(flag))),
            "--paper" | "-p" => paper = Some(parse_or_exit(&value(flag))),
            "--landscape" | "-l" => landscape = true,
            "--bleed" => bleed = Some(parse_or_exit(&value(flag))),
            "--crop-marks" => crop_marks = true,
            "--safe-zone" => safe_zone = true,
            "--transparent" => transparent = true,
            "--color" => color = Some(parse_or_exit(&value(flag))),
            "--pages" => pages = Some(parse_or_exit(&value(flag))),
            "--template-only-pages" => template_only_pages = true,
            "--jpeg-quality" => jpeg_quality = Some(parse_or_exit(&value(flag))),
            "--tier" => tier = value(flag),
            "--request" => request_path = Some(PathBuf::from(value(flag))),
            "--rows" => rows_path = Some(PathBuf::from(value(flag))),
            "--template" => template = Some(value(flag)),
            "--title" | "-t" => title = Some(value(flag)),
            "--watermark" => watermark = Some(value(flag)),
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let scene_json = match (&input_path, &template) {
        (Some(_), Some(_)) => {
            eprintln!("Error: give either a scene file or --template, not both.");
            process::exit(1);
        }
        (Some(p), None) => read_or_exit(p),
        (None, Some(name)) => match name.as_str() {
            "calendar" => templates::calendar().to_string(),
            "card" | "greeting-card" => templates::greeting_card().to_string(),
            "minimal" => templates::minimal().to_string(),
            other => {
                eprintln!("Error: unknown template '{other}' (calendar, card, minimal).");
                process::exit(1);
            }
        },
        (None, None) => {
            eprintln!("Error: no scene file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };
    let document = SceneDocument::from_json(&scene_json).unwrap_or_else(|e| exit_with(&e));

    // Flags override whatever the request file says.
    let mut request = match &request_path {
        Some(p) => ExportRequest::from_json(&read_or_exit(p)).unwrap_or_else(|e| exit_with(&e)),
        None => ExportRequest::default(),
    };
    if let Some(f) = format {
        request.format = f;
    }
    if let Some(q) = quality {
        request.quality = q;
    }
    if let Some(p) = paper {
        request.paper_size = p;
    }
    if landscape {
        request.orientation = PageOrientation::Landscape;
    }
    if let Some(b) = bleed {
        request.bleed_mm = b;
    }
    request.crop_marks |= crop_marks;
    request.safe_zone |= safe_zone;
    request.transparent_background |= transparent;
    if let Some(c) = color {
        request.color_profile = c;
    }
    if template_only_pages {
        request.multi_page_include_user_objects = false;
    }
    request.page_selection = match pages {
        Some(p) => p,
        None if request_path.is_none() && request.format == ExportFormat::PrintDocument => PageSelection::All,
        None => request.page_selection,
    };

    let capability = TierCapability::preset(&tier).unwrap_or_else(|e| exit_with(&e));

    let mut config = PipelineConfig::default();
    if let Some(t) = title {
        config.title = t.clone();
        config.file_stem = Some(t);
    }
    if let Some(w) = watermark {
        config.watermark_text = w;
    }
    if let Some(q) = jpeg_quality {
        config.jpeg_quality = q;
    }
    let orchestrator = ExportOrchestrator::new(config);
    let context = RenderContext::new(document);

    // Default output directory: next to the input, else the working directory.
    let out_dir = input_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();

    match rows_path {
        Some(rows_file) => {
            let rows = load_rows(&rows_file);
            let total = rows.len();
            let result = orchestrator
                .export_rows(&context, rows, &request, &capability, |p| {
                    log::debug!("batch progress {}/{}", p.completed, p.total);
                })
                .unwrap_or_else(|e| exit_with(&e));
            match &result.archive {
                Some(archive) => {
                    let output = output_path.unwrap_or_else(|| out_dir.join(&archive.suggested_filename));
                    write_or_exit(&output, &archive.bytes);
                    eprintln!(
                        "Wrote '{}' ({} bytes, {} of {} row{})",
                        output.display(),
                        archive.bytes.len(),
                        result.succeeded_count,
                        total,
                        if total == 1 { "" } else { "s" }
                    );
                }
                None => eprintln!("No archive written."),
            }
            eprintln!("{result}");
            if result.outcome().is_err() {
                process::exit(2);
            }
        }
        None => {
            let artifact = orchestrator
                .export_one(&context, &request, &capability)
                .unwrap_or_else(|e| exit_with(&e));
            let output = output_path.unwrap_or_else(|| out_dir.join(&artifact.suggested_filename));
            write_or_exit(&output, &artifact.bytes);
            eprintln!(
                "Wrote '{}' ({} bytes, {})",
                output.display(),
                artifact.bytes.len(),
                artifact.mime_type
            );
        }
    }
}

fn parse_or_exit<T>(raw: &str) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.parse() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn exit_with(err: &print_forge::ExportError) -> ! {
    eprintln!("Error: {err}");
    process::exit(1);
}

fn read_or_exit(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn load_rows(path: &Path) -> Vec<PersonalizationRow> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let parsed = if is_csv {
        match fs::File::open(path) {
            Ok(file) => PersonalizationRow::rows_from_csv(file),
            Err(e) => {
                eprintln!("Error reading '{}': {e}", path.display());
                process::exit(1);
            }
        }
    } else {
        PersonalizationRow::rows_from_json(&read_or_exit(path))
    };
    parsed.unwrap_or_else(|e| exit_with(&e))
}

fn write_or_exit(output: &Path, bytes: &[u8]) {
    // Create output directory if necessary.
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(output, bytes) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("forge – print export (print-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <scene.json> [output] [flags]");
    eprintln!("  {prog} --template <calendar|card|minimal> [output] [flags]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <scene.json>   Scene document (images must be base64 data URIs; others are skipped)");
    eprintln!("  [output]       Output path  (default: suggested file name next to the input)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --format, -f       png | jpeg | svg | pdf (default: png)");
    eprintln!("  --quality, -q      screen (72 DPI) | print | press (300 DPI)");
    eprintln!("  --paper, -p        a2..a6, letter, legal, tabloid, or WxH[mm|cm|in|pt]");
    eprintln!("  --landscape, -l    Swap the named paper size's width and height");
    eprintln!("  --bleed MM         Bleed on every side, in millimetres");
    eprintln!("  --crop-marks       Draw crop marks outside the trim box (PDF)");
    eprintln!("  --safe-zone        Draw the safe-zone guide (PDF)");
    eprintln!("  --transparent      Transparent background (PNG only)");
    eprintln!("  --color            srgb | adobe-rgb | cmyk");
    eprintln!("  --pages            all | current | list such as 1,3,5-7");
    eprintln!("  --template-only-pages  Render user objects on the current page only");
    eprintln!("  --jpeg-quality N   JPEG quality 1-100 (default: 95)");
    eprintln!("  --tier             free | pro | business (default: free)");
    eprintln!("  --request FILE     Load the export request from JSON; flags still override");
    eprintln!("  --rows FILE        Personalization rows (.csv or JSON array); writes a ZIP");
    eprintln!("  --title, -t        Document title and output file stem");
    eprintln!("  --watermark TEXT   Watermark text on tiers that require one");
    eprintln!("  --help             Print this message");
}

extern crate pretty_env_logger;

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{arg, command, ArgMatches, Command};

use bubble_sheet::answer_key::AnswerKey;
use bubble_sheet::batch::{expand_sheet_paths, grade_sheets};
use bubble_sheet::exam::ExamDefinition;
use bubble_sheet::interpret::{check_mark_threshold, DetectionOptions};
use bubble_sheet::layout::{default_font, load_font, write_sheets, SheetRenderer};

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("generate", matches)) => generate(matches),
        Some(("grade", matches)) => grade(matches),
        _ => unreachable!("a subcommand is required"),
    }
}

fn load_exam_definition(matches: &ArgMatches) -> ExamDefinition {
    let exam_path = matches
        .get_one::<String>("exam")
        .expect("exam path is required");

    match ExamDefinition::load(Path::new(exam_path)) {
        Ok(definition) => definition,
        Err(e) => {
            eprintln!("Error loading exam definition: {}", e);
            exit(1);
        }
    }
}

fn load_optional_font(matches: &ArgMatches) -> Option<rusttype::Font<'static>> {
    let font_path = matches.get_one::<String>("font")?;
    match load_font(Path::new(font_path)) {
        Ok(font) => Some(font),
        Err(e) => {
            eprintln!("Error loading font: {}", e);
            exit(1);
        }
    }
}

fn generate(matches: &ArgMatches) {
    let definition = load_exam_definition(matches);
    let out_dir = matches
        .get_one::<String>("out-dir")
        .expect("output directory is required");
    let renderer = load_optional_font(matches)
        .map(SheetRenderer::new)
        .unwrap_or_default();

    match write_sheets(&definition, Path::new(out_dir), &renderer) {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Error generating sheets: {}", e);
            exit(1);
        }
    }
}

fn grade(matches: &ArgMatches) {
    let definition = load_exam_definition(matches);
    let key_path = matches
        .get_one::<String>("key")
        .expect("answer key path is required");
    let inputs = matches
        .get_many::<String>("sheets")
        .expect("at least one sheet is required")
        .map(PathBuf::from)
        .collect::<Vec<_>>();

    // without a key nothing can be graded, so stop before reading any sheet
    let key = match AnswerKey::load(Path::new(key_path)) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error loading answer key: {}", e);
            exit(1);
        }
    };

    let sheet_paths = match expand_sheet_paths(&inputs) {
        Ok(paths) if paths.is_empty() => {
            eprintln!("Error: no sheet images to grade");
            exit(1);
        }
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error finding sheets: {}", e);
            exit(1);
        }
    };

    let geometry = match definition.geometry() {
        Ok(geometry) => geometry,
        Err(e) => {
            eprintln!("Error computing sheet layout: {}", e);
            exit(1);
        }
    };

    let mut options = DetectionOptions {
        debug: matches.get_flag("debug"),
        debug_font: Some(load_optional_font(matches).unwrap_or_else(default_font)),
        ..DetectionOptions::default()
    };
    if let Some(threshold) = matches
        .get_one::<f32>("threshold")
        .copied()
        .or(definition.mark_threshold)
    {
        options.mark_threshold = threshold;
    }

    let report = grade_sheets(&sheet_paths, &geometry, &key, &options);
    for failure in &report.failures {
        eprintln!("Skipped {}: {}", failure.path.display(), failure.error);
    }
    eprintln!("{}", report.summary());

    let json = match serde_json::to_string_pretty(&report.records) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing results: {}", e);
            exit(1);
        }
    };
    match matches.get_one::<String>("output") {
        Some(output_path) => {
            if let Err(e) = std::fs::write(output_path, json) {
                eprintln!("Error writing results to {}: {}", output_path, e);
                exit(1);
            }
        }
        None => println!("{}", json),
    }
}

fn parse_mark_threshold(value: &str) -> Result<f32, String> {
    let threshold = value.parse::<f32>().map_err(|e| e.to_string())?;
    check_mark_threshold(threshold).map_err(|e| e.to_string())
}

fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .subcommand(
            Command::new("generate")
                .about("Render one answer sheet per exam model")
                .arg(arg!(-e --exam <PATH> "Path to exam.json file").required(true))
                .arg(arg!(-o --"out-dir" <DIR> "Directory to write sheets to").required(true))
                .arg(arg!(-f --font <PATH> "TrueType font used for labels instead of the bundled one")),
        )
        .subcommand(
            Command::new("grade")
                .about("Read scanned sheets and score them against an answer key")
                .arg(arg!(-e --exam <PATH> "Path to exam.json file").required(true))
                .arg(arg!(-k --key <PATH> "Path to the answer key JSON export").required(true))
                .arg(arg!(-o --output <PATH> "Write results here instead of stdout"))
                .arg(
                    arg!(-t --threshold <RATIO> "Fill ratio a bubble must exceed to count as marked")
                        .value_parser(parse_mark_threshold),
                )
                .arg(arg!(-d --debug "Write debug images next to each sheet"))
                .arg(arg!(-f --font <PATH> "TrueType font used to label debug images"))
                .arg(
                    arg!(sheets: <SHEET_IMAGE> ... "Scanned sheet images or directories of them")
                        .required(true),
                ),
        )
}

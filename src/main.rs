use clap::Parser;
use color_eyre::Result;
use m4btui::app::App;
use m4btui::args::Options;
use m4btui::convert::Converter;
use m4btui::logging::{LogBuffer, LogSink, init_tracing};
use m4btui::rewrite::RulePipeline;
use m4btui::rules_file;
use m4btui::scan::{AudioFile, FfprobeProbe, scan_directory};

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Options::parse();

    let logs = LogBuffer::default();
    let sink = if args.no_tui {
        LogSink::Stderr
    } else {
        LogSink::Buffer(logs.clone())
    };
    init_tracing(&args.log_level, sink);

    let files = scan_directory(&args.input_dir, args.recursive, &FfprobeProbe)?;
    let mut pipeline = match &args.rules {
        Some(path) if path.exists() => rules_file::load(path)?,
        _ => RulePipeline::new(),
    };
    pipeline.extend(args.extra_rules.iter().cloned());

    if args.no_tui {
        return run_batch(&args, &files, &pipeline);
    }

    let terminal = ratatui::init();
    let result = App::new(&args, files, pipeline, logs).run(terminal);
    ratatui::restore();
    result
}

fn run_batch(args: &Options, files: &[AudioFile], pipeline: &RulePipeline) -> Result<()> {
    let originals: Vec<&str> = files.iter().map(|f| f.title.as_str()).collect();
    let titles = pipeline.resolve_all(&originals);
    for (i, (original, title)) in originals.iter().zip(&titles).enumerate() {
        println!("{:>3}  {} -> {}", i + 1, original, title);
    }

    let Some(output) = &args.output else {
        return Ok(());
    };
    if args.dry_run {
        return Ok(());
    }
    Converter::new(args.settings(), args.metadata()).run(files, &titles, output, &FfprobeProbe)?;
    Ok(())
}

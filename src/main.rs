use anyhow::{Context as _, Error, Result};
use clap::Parser;
use ctf_fs::{
    cli::*,
    context::Context,
    fs::{CtfFsSource, SourceParams},
    logging,
    processors::{print_trace::TextPrinter, write_trace::WriterComponent},
    NotificationSink, NotificationSource,
};
use serde_json::json;

fn source_params(ctx: &Context) -> Result<&SourceParams> {
    ctx.source.as_ref().context("no trace path given")
}

pub fn run<S: NotificationSink>(mut sink: S, ctx: &Context) -> Result<()> {
    sink.pre_load_init(ctx)?;

    let mut src = CtfFsSource::open(source_params(ctx)?)?;
    src.process_notifications(sink, ctx)
}

fn list(ctx: &Context) -> Result<()> {
    let src = CtfFsSource::open(source_params(ctx)?)?;

    for trace in src.traces() {
        println!("{} ({})", trace.name(), trace.path().display());

        for port in trace.ports() {
            let group = port.group();
            let sc = trace.class().stream_class(group.stream_class());
            let instance = group
                .stream_instance_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {}: stream class {}, instance {}", port.name(), sc.id, instance);

            for file in group.files() {
                let begin = file
                    .begin_ns
                    .map(|ns| ns.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("    {} (begins at {} ns)", file.path.display(), begin);
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Error> {
    let opts = CLI::parse();
    logging::init(opts.verbose);
    let ctx = Context::from(&opts);

    match &opts.command {
        CtfFsSubCommand::Convert { .. } => {
            let sink = WriterComponent::try_from(&ctx)?;

            run(sink, &ctx)
        }
        CtfFsSubCommand::List { .. } => list(&ctx),
        CtfFsSubCommand::Print { .. } => run(TextPrinter::stdout(), &ctx),
        CtfFsSubCommand::Query { object, path } => {
            let res = CtfFsSource::query(object.name(), &json!({ "path": path }))?;
            println!("{}", serde_json::to_string_pretty(&res)?);

            Ok(())
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use elasticc::phases::{
    do_parse, evaluate_block, load_code, lower_block, select_top_block, write_vhdl,
};
use elasticc::report::{MessageLevel, Reporter};
use elasticc::Error;

/// ElasticC to VHDL high-level synthesis compiler.
#[derive(Parser, Debug)]
#[command(name = "elasticc", disable_version_flag = true)]
struct Args {
    /// Input source file.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Input source file (positional form).
    #[arg(value_name = "INPUT")]
    input_positional: Option<PathBuf>,

    /// Output VHDL path; defaults to the input path plus `.vhd`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase output verbosity.
    #[arg(short, long)]
    verbose: bool,

    /// Decrease output verbosity.
    #[arg(short, long)]
    quiet: bool,

    /// Name of the top-level block when the design has several.
    #[arg(long)]
    top: Option<String>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::from(3);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(2);
        }
    };

    let Some(input) = args.input.clone().or(args.input_positional.clone()) else {
        eprintln!("Usage:");
        eprintln!("elasticc [options] input.ecc");
        eprintln!();
        eprintln!("Run elasticc --help for available options");
        return ExitCode::from(3);
    };

    let verbosity = if args.verbose {
        MessageLevel::Debug
    } else if args.quiet {
        MessageLevel::Warning
    } else {
        MessageLevel::Note
    };
    let reporter = Reporter::new(verbosity);

    match run(&args, &input, &reporter) {
        Ok(()) if reporter.error_count() == 0 => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(e) => {
            let message = match &e {
                Error::Parse(p) => format!("Parse Error: {p}"),
                Error::Eval(ev) => format!("Evaluation Error: {ev}"),
                Error::Io(io) => io.clone(),
            };
            reporter.error(&message);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, input: &PathBuf, reporter: &Reporter) -> Result<(), Error> {
    let code = load_code(input)?;
    reporter.debug(&format!("loaded input file {}", input.display()));

    let ast = do_parse(code, reporter)?;
    if reporter.error_count() > 0 {
        return Ok(());
    }

    let Some(top) = select_top_block(&ast, args.top.as_deref(), reporter)? else {
        return Ok(());
    };

    let mut eval = evaluate_block(&ast, reporter, top)?;
    let sc = lower_block(&mut eval, top)?;

    if reporter.verbosity() <= MessageLevel::Debug {
        print_design_summary(&sc.design);
    }

    let vhdl = sc.design.generate_vhdl()?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.vhd", input.display())));
    write_vhdl(&vhdl, &output)?;
    reporter.note(&format!("wrote ==={}===", output.display()));
    Ok(())
}

fn print_design_summary(design: &elasticc::HdlDesign) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Port", "Dir", "Type", "Delay", "Latency"]);
    for port in design.entity_ports() {
        let signal = design.signal(port.signal);
        table.add_row([
            signal.name.clone(),
            port.dir.vhdl().to_string(),
            signal.ty.vhdl_type(),
            format!("{:.1}", signal.timing_delay.value),
            signal.pipeline_latency.value.to_string(),
        ]);
    }
    println!("Entity {}:", design.name);
    println!("{table}");
    let devices = design.devices().count();
    let signals = design.signals().count();
    println!("{devices} devices, {signals} signals");
}

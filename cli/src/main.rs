use clap::Parser;
use testbench_cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = testbench_cli::init_tracing(cli.quiet, cli.verbose) {
        eprintln!("testbench error: {error:#}");
        std::process::exit(1);
    }
    if let Err(error) = testbench_cli::run(cli) {
        eprintln!("testbench error: {error:#}");
        std::process::exit(1);
    }
}

use clap::Parser;

fn main() {
    let cli = chachactl::Cli::parse();
    if let Err(err) = chachactl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

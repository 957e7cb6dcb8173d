use clap::Parser;

fn main() {
    let cli = beebasm_rs::cli::Cli::parse();
    match beebasm_rs::cli::run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("beebasm: {e}");
            std::process::exit(1);
        }
    }
}

mod cli;

use std::process;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

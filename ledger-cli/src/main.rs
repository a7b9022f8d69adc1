#![forbid(unsafe_code)]
pub fn main() {
    ledger_cli::run_cli();
}

fn main() {
    if let Err(error) = board_engine_lib::run() {
        eprintln!("board-engine: {:#}", error);
        std::process::exit(1);
    }
}

// src/main.rs
//
// Entry point: parse CLI options, initialize logging, hand off to the
// supervisor, and translate a returned error into its exit code (0
// normal, -1 option error, -3 serial setup error, -4 file open error).

fn main() {
    let options = match orbflux_lib::options::Options::parse_from_argv() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("orbflux: {e}");
            std::process::exit(e.exit_code());
        }
    };

    orbflux_lib::logging::init(options.verbosity);

    if let Err(e) = orbflux_lib::run(options) {
        tracing::error!("{e}");
        std::process::exit(e.exit_code());
    }
}

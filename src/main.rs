use takc::cli::Config;

fn main() {
    let config = Config::parse_args();
    std::process::exit(takc::compile::run(&config));
}

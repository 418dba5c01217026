struct CliFlags {
    offline: bool,
    handled: bool,
}

fn main() {
    let flags = handle_cli_flags();
    if flags.handled {
        return;
    }

    if let Err(err) = reelgram::run(flags.offline) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> CliFlags {
    let mut flags = CliFlags {
        offline: false,
        handled: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("reelgram {}", reelgram::VERSION);
                flags.handled = true;
            }
            "--help" | "-h" => {
                println!(
                    "reelgram - Browse posts and reels from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --offline            Use the built-in sample feed instead of the backend"
                );
                flags.handled = true;
            }
            "--offline" => flags.offline = true,
            other => {
                eprintln!("error: unknown argument '{other}' (see --help)");
                std::process::exit(2);
            }
        }
    }
    flags
}

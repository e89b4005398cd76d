use glucoframe::{
    app::{App, SETUP_EXIT_CODE},
    cli::{Command, RunOptions},
    Error, Result,
};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        let code = match err {
            Error::NeedsSetup(_) => SETUP_EXIT_CODE,
            _ => 1,
        };
        std::process::exit(code);
    }
}

fn try_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match Command::parse(&args) {
        Ok(Command::ShowHelp) => {
            Command::print_help();
            Ok(())
        }
        Ok(Command::ShowVersion) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Ok(Command::Run(opts)) => run(*opts),
        Err(err) => {
            Command::print_help();
            Err(err)
        }
    }
}

fn run(opts: RunOptions) -> Result<()> {
    let app = App::from_options(opts)?;
    app.run()
}

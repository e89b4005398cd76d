use crate::{Error, Result};

/// Options for the `run` command; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub config_path: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub mode: Option<String>,
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

/// Parsed command-line intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Box<RunOptions>),
    ShowHelp,
    ShowVersion,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        if args.is_empty() {
            return Ok(Command::Run(Box::default()));
        }

        let mut iter = args.iter();
        match iter.next().map(|s| s.as_str()) {
            Some("run") => Ok(Command::Run(Box::new(parse_run_options(&mut iter)?))),
            Some("--help") | Some("-h") => Ok(Command::ShowHelp),
            Some("--version") | Some("-V") => Ok(Command::ShowVersion),
            Some(flag) if flag.starts_with('-') => {
                // `run` is optional: re-feed the consumed flag into the run parser.
                let mut flags: Vec<String> = Vec::with_capacity(args.len());
                flags.push(flag.to_string());
                flags.extend(iter.map(|s| s.to_string()));
                let mut iter = flags.iter();
                Ok(Command::Run(Box::new(parse_run_options(&mut iter)?)))
            }
            Some(cmd) => Err(Error::InvalidArgs(format!(
                "unknown command '{cmd}', try --help"
            ))),
            None => Ok(Command::Run(Box::default())),
        }
    }

    pub fn help() -> &'static str {
        concat!(
            "glucoframe - glucose monitor display daemon\n",
            "\n",
            "USAGE:\n",
            "  glucoframe run [--config <path>] [--endpoint <url>] [--token <secret>] [--mode <name>]\n",
            "                 [--data-dir <path>] [--log-level <level>] [--log-file <path>]\n",
            "  glucoframe --help\n",
            "  glucoframe --version\n",
            "\n",
            "OPTIONS:\n",
            "  --config <path>     Config file (default: ~/.glucoframe/config.toml)\n",
            "  --endpoint <url>    Backend base URL, overrides api_endpoint\n",
            "  --token <secret>    Backend api-secret, overrides api_token\n",
            "  --mode <name>       Initial display mode (full_elapsed, full_date, full_battery, basic,\n",
            "                      flip_full_elapsed, flip_full_date, flip_full_battery, chart, flip_chart)\n",
            "  --data-dir <path>   Directory for the reading cache and response snapshot\n",
            "  --log-level <lvl>   error | warn | info | debug | trace\n",
            "  --log-file <path>   Append log lines to this file\n",
            "  -h, --help          Show this help\n",
            "  -V, --version       Show version\n",
        )
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}

fn parse_run_options(iter: &mut std::slice::Iter<String>) -> Result<RunOptions> {
    let mut opts = RunOptions::default();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => opts.config_path = Some(take_value(flag, iter)?),
            "--endpoint" => opts.endpoint = Some(take_value(flag, iter)?),
            "--token" => opts.token = Some(take_value(flag, iter)?),
            "--mode" => opts.mode = Some(take_value(flag, iter)?),
            "--data-dir" => opts.data_dir = Some(take_value(flag, iter)?),
            "--log-level" => opts.log_level = Some(take_value(flag, iter)?),
            "--log-file" => opts.log_file = Some(take_value(flag, iter)?),
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown flag '{other}', try --help"
                )));
            }
        }
    }

    Ok(opts)
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::InvalidArgs(format!("expected a value after {flag}")))
}

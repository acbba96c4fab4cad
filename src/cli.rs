#[cfg(feature = "bin")]
pub mod bin {
    use std::io::Read;
    use std::path::PathBuf;
    use std::time::Duration;

    use clap::Parser;

    use crate::layout::LayoutSettings;
    use crate::problem::{Problem, RunConfig};
    use crate::strategy::StrategySettings;
    use crate::term::FormulaTermLabel;
    use crate::Error;

    #[derive(Debug, Parser)]
    #[command(version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
    struct Args {
        /// Maximal number of rule applications per proof
        #[clap(long, default_value = "10000")]
        max_steps: usize,
        /// Stops a proof search after this many milliseconds
        #[clap(long)]
        timeout_ms: Option<u64>,
        /// Prints the memory layouts of each posed sequent with a modality
        #[clap(long)]
        layouts: bool,
        /// Rule applications of the layout side proofs
        #[clap(long, default_value = "8000")]
        layout_steps: usize,
        /// Lower bound of the rule applications per goal of a layout side proof
        #[clap(long, default_value = "300")]
        min_steps_per_goal: usize,
        /// Prints the truth values of labeled proofs, traced through labels of this name
        #[clap(long, num_args = 0..=1, default_missing_value = FormulaTermLabel::NAME)]
        trace_label: Option<String>,
        /// The problem files to run. Reads standard input if there are none.
        inputs: Vec<PathBuf>,
    }

    impl Args {
        fn config(&self) -> RunConfig {
            RunConfig {
                strategy: StrategySettings {
                    max_steps: self.max_steps,
                    timeout: self.timeout_ms.map(Duration::from_millis),
                },
                layout: LayoutSettings {
                    max_proof_steps: self.layout_steps,
                    min_steps_per_goal: self.min_steps_per_goal,
                    ..LayoutSettings::default()
                },
                print_layouts: self.layouts,
                trace_label: self.trace_label.clone(),
            }
        }
    }

    fn run(config: &RunConfig, filename: Option<String>, program: &str) -> Result<(), Error> {
        let mut problem = Problem::new(config.clone())?;
        for msg in problem.parse_and_run_program(filename, program)? {
            println!("{msg}");
        }
        Ok(())
    }

    fn exit_on_error(result: Result<(), Error>) {
        if let Err(err) = result {
            log::error!("{err}");
            std::process::exit(1)
        }
    }

    /// Start the command-line interface: run each problem file in turn.
    #[allow(clippy::disallowed_macros)]
    pub fn cli() {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .format_timestamp(None)
            .format_target(false)
            .parse_default_env()
            .init();

        let args = Args::parse();
        let config = args.config();

        if args.inputs.is_empty() {
            let mut program = String::new();
            exit_on_error(
                std::io::stdin()
                    .read_to_string(&mut program)
                    .map(drop)
                    .map_err(|e| Error::Io(PathBuf::from("<stdin>"), e)),
            );
            exit_on_error(run(&config, None, &program));
        } else {
            for input in &args.inputs {
                let program = std::fs::read_to_string(input)
                    .map_err(|e| Error::Io(input.clone(), e));
                exit_on_error(program.and_then(|program| {
                    log::info!("running {}", input.display());
                    run(&config, Some(input.to_string_lossy().into_owned()), &program)
                }));
            }
        }
    }
}

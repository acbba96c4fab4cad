use std::path::PathBuf;

use hashbrown::HashSet;
use libtest_mimic::Trial;
use taclet::problem::{Problem, RunConfig};
use taclet::term::FormulaTermLabel;

#[derive(Clone)]
struct Run {
    path: PathBuf,
    print_layouts: bool,
}

impl Run {
    fn run(&self) {
        let _ = env_logger::builder().is_test(true).try_init();
        let program = std::fs::read_to_string(&self.path)
            .unwrap_or_else(|err| panic!("Couldn't read {:?}: {:?}", self.path, err));
        let config = RunConfig {
            print_layouts: self.print_layouts,
            trace_label: Some(FormulaTermLabel::NAME.to_owned()),
            ..RunConfig::default()
        };
        let mut problem = Problem::new(config).unwrap();
        match problem.parse_and_run_program(self.path.to_str().map(String::from), &program) {
            Ok(msgs) => {
                if self.should_fail() {
                    panic!(
                        "Program should have failed! Instead, logged:\n {}",
                        msgs.join("\n")
                    );
                }
                for msg in &msgs {
                    log::info!("  {}", msg);
                }
            }
            Err(err) => {
                if !self.should_fail() {
                    panic!("Top level error: {err}")
                }
            }
        }
    }

    fn into_trial(self) -> Trial {
        let name = self.name().to_string();
        Trial::test(name, move || {
            self.run();
            Ok(())
        })
    }

    fn name(&self) -> impl std::fmt::Display + '_ {
        struct Wrapper<'a>(&'a Run);
        impl std::fmt::Display for Wrapper<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                if self.0.should_fail() {
                    write!(f, "fail/")?;
                }
                let stem = self.0.path.file_stem().unwrap();
                let stem_str = stem.to_string_lossy().replace(['.', '-', ' '], "_");
                write!(f, "{stem_str}")?;
                if self.0.print_layouts {
                    write!(f, "_layouts")?;
                }
                Ok(())
            }
        }
        Wrapper(self)
    }

    fn should_fail(&self) -> bool {
        self.path
            .parent()
            .is_some_and(|dir| dir.ends_with("fail"))
    }
}

fn generate_tests(glob: &str) -> Vec<Trial> {
    let mut trials = vec![];
    for entry in glob::glob(glob).unwrap() {
        let run = Run {
            path: entry.unwrap(),
            print_layouts: false,
        };
        let should_fail = run.should_fail();
        trials.push(run.clone().into_trial());
        // layouts are reported for every posed sequent with a modality
        if !should_fail {
            trials.push(
                Run {
                    print_layouts: true,
                    ..run
                }
                .into_trial(),
            );
        }
    }
    trials
}

fn main() {
    let args = libtest_mimic::Arguments::from_args();
    let tests = generate_tests("tests/problems/**/*.tac");
    // ensure all the tests have unique names
    let mut names = HashSet::new();
    for test in &tests {
        let name = test.name().to_string();
        if !names.insert(name.clone()) {
            panic!("Duplicate test name: {}", name);
        }
    }
    libtest_mimic::run(&args, tests).exit();
}

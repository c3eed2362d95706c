// ssi: symbolic C interpreter shell

use anyhow::{bail, Context, Result};
use ssi::{Interpreter, SessionConfig, Shell};
use std::io::{self, IsTerminal};

struct Args {
    file: String,
    config: SessionConfig,
    actions: Vec<(String, String)>,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} FILE [--strict] [--no-color] [--action WORD=FUNCTION]...\n\n\
         Examples:\n  \
         {} driver.c\n  \
         {} driver.c --action enable-irq=enable_irq",
        program, program, program
    )
}

fn parse_args(args: &[String]) -> Result<Args> {
    let program = args.first().map(|s| s.as_str()).unwrap_or("ssi");
    let mut file = None;
    let mut config = SessionConfig::default().with_color(io::stdout().is_terminal());
    let mut actions = Vec::new();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--strict" => config = config.with_strict_names(true),
            "--no-color" => config = config.with_color(false),
            "--action" => {
                let spec = rest.next().context("--action needs WORD=FUNCTION")?;
                let (word, function) = spec
                    .split_once('=')
                    .with_context(|| format!("bad action '{}', expected WORD=FUNCTION", spec))?;
                actions.push((word.to_string(), function.to_string()));
            }
            "-h" | "--help" => bail!("{}", usage(program)),
            other if other.starts_with("--") => bail!("unknown option '{}'\n\n{}", other, usage(program)),
            other if file.is_none() => file = Some(other.to_string()),
            other => bail!("unexpected argument '{}'\n\n{}", other, usage(program)),
        }
    }
    let Some(file) = file else {
        bail!("no input file provided\n\n{}", usage(program));
    };
    Ok(Args { file, config, actions })
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Args { file, config, actions } = parse_args(&args)?;

    let mut interp = Interpreter::from_file(&file, config.clone()).with_context(|| format!("loading {}", file))?;
    eprintln!(
        "Loaded {} ({} functions)",
        file,
        interp.unit().function_names().len()
    );

    let stdin = io::stdin();
    let mut shell = Shell::new(stdin.lock(), io::stdout(), &config);
    for (word, function) in &actions {
        shell = shell.with_action(word, function);
    }

    if let Err(e) = interp.run_globals(&mut shell) {
        eprintln!("error in file-scope code: {}", e);
    }
    shell.run(&mut interp).context("shell i/o")?;
    Ok(())
}

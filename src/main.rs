use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::LevelFilter;
use micrograd::config::{Cli, Command, DemoConfig, TrainConfig};
use micrograd::engine::Value;
use micrograd::train::{train, TARGETS};
use micrograd::viz::render_dot;

/// Logger reading `RUST_LOG`, with `--log-level` taking precedence.
fn logger_builder(level: Option<LevelFilter>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder
}

/// `L = (a * b + c) * f` with every node labeled, after a backward pass.
/// Returns `[a, b, c, d, e, f, L]`.
fn demo_graph() -> Vec<Value> {
    let a = Value::new(2.0).labeled("a");
    let b = Value::new(-3.0).labeled("b");
    let c = Value::new(10.0).labeled("c");
    let e = (&a * &b).labeled("e");
    let d = (&e + &c).labeled("d");
    let f = Value::new(-2.0).labeled("f");
    let l = (&d * &f).labeled("L");
    l.backward();

    vec![a, b, c, d, e, f, l]
}

fn gradient_lines(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| {
            format!(
                "{}: data={:.4} grad={:.4}",
                v.label().unwrap_or_default(),
                v.data(),
                v.grad()
            )
        })
        .collect()
}

fn demo(config: &DemoConfig) -> Result<()> {
    let values = demo_graph();
    let Some(root) = values.last() else {
        return Ok(());
    };
    let dot = render_dot(root, config.rankdir);

    match &config.output {
        Some(path) => {
            std::fs::write(path, &dot)
                .wrap_err_with(|| format!("writing graph to {}", path.display()))?;
            log::info!("graph written to {}", path.display());
        }
        None => println!("{dot}"),
    }
    for line in gradient_lines(&values) {
        eprintln!("{line}");
    }

    Ok(())
}

fn run_training(config: &TrainConfig) -> Result<()> {
    let report = train(config, |step, loss| println!("step {step:>4} loss {loss:.6}"))?;

    for (pred, target) in report.predictions.iter().zip(TARGETS) {
        println!("prediction {pred:+.4} target {target:+.1}");
    }

    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logger_builder(cli.log_level).init();

    match cli.command {
        Command::Demo(config) => demo(&config),
        Command::Train(config) => run_training(&config),
    }
}

//! Command line configuration for the `micrograd` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use crate::engine::ValueType;
use crate::error::{Error, Result};
use crate::viz::RankDir;

#[derive(Parser, Debug)]
#[command(name = "micrograd", version, about = "Scalar reverse-mode autograd playground")]
pub struct Cli {
    /// Log level, overriding RUST_LOG for every module
    #[arg(long, global = true)]
    pub log_level: Option<LevelFilter>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a small expression, back-propagate and print its graph
    Demo(DemoConfig),
    /// Train a multilayer perceptron on a four-sample toy dataset
    Train(TrainConfig),
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct DemoConfig {
    /// Graph layout direction, LR or TB
    #[arg(long, default_value = "LR")]
    pub rankdir: RankDir,

    /// Write the DOT graph to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Seed for weight initialisation
    #[arg(long, default_value_t = 1337)]
    pub seed: u64,

    #[arg(long, default_value_t = 50)]
    pub steps: usize,

    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: ValueType,

    /// Layer sizes after the input layer, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = [4, 4, 1])]
    pub layers: Vec<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            steps: 50,
            learning_rate: 0.05,
            layers: vec![4, 4, 1],
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.steps == 0 {
            return Err(Error::InvalidConfig("steps must be at least 1".to_string()));
        }
        if self.layers.iter().any(|&n| n == 0) {
            return Err(Error::InvalidConfig("layer sizes must be non-zero".to_string()));
        }
        match self.layers.last() {
            None => Err(Error::EmptyNetwork),
            Some(1) => Ok(()),
            Some(n) => Err(Error::InvalidConfig(format!(
                "the output layer must have a single neuron, got {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("micrograd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn train_defaults() {
        match parse(&["train"]).command {
            Command::Train(cfg) => assert_eq!(cfg, TrainConfig::default()),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn train_overrides() {
        let cli = parse(&[
            "train",
            "--seed",
            "7",
            "--steps",
            "3",
            "--learning-rate",
            "0.1",
            "--layers",
            "8,1",
        ]);
        match cli.command {
            Command::Train(cfg) => {
                assert_eq!(cfg.seed, 7);
                assert_eq!(cfg.steps, 3);
                assert_eq!(cfg.learning_rate, 0.1);
                assert_eq!(cfg.layers, vec![8, 1]);
                assert!(cfg.validate().is_ok());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn demo_rankdir() {
        match parse(&["demo", "--rankdir", "TB"]).command {
            Command::Demo(cfg) => {
                assert_eq!(cfg.rankdir, RankDir::TopBottom);
                assert_eq!(cfg.output, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["micrograd", "demo", "--rankdir", "XY"]).is_err());
    }

    #[test]
    fn demo_output_path() {
        match parse(&["demo", "--output", "graph.dot"]).command {
            Command::Demo(cfg) => assert_eq!(cfg.output, Some(PathBuf::from("graph.dot"))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_level_is_global() {
        assert_eq!(parse(&["train"]).log_level, None);
        assert_eq!(
            parse(&["train", "--log-level", "debug"]).log_level,
            Some(LevelFilter::Debug)
        );
        assert_eq!(
            parse(&["--log-level", "trace", "demo"]).log_level,
            Some(LevelFilter::Trace)
        );
    }

    #[test]
    fn validation() {
        let bad_lr = TrainConfig {
            learning_rate: -1.,
            ..Default::default()
        };
        assert!(matches!(bad_lr.validate(), Err(Error::InvalidConfig(_))));

        let no_layers = TrainConfig {
            layers: vec![],
            ..Default::default()
        };
        assert_eq!(no_layers.validate(), Err(Error::EmptyNetwork));

        let wide_output = TrainConfig {
            layers: vec![4, 2],
            ..Default::default()
        };
        assert!(wide_output.validate().is_err());
    }
}

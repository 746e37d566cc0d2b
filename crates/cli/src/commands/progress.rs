//! Console feedback for long-running pipeline stages

use colored::Colorize;
use glove_lib::{Checkpoint, PipelineObserver};
use std::io::Write;

use crate::output::{color_accuracy, print_success};

/// Prompts the wearer during collection and reports training checkpoints
pub struct ConsoleObserver {
    num_reps: usize,
}

impl ConsoleObserver {
    pub fn new(num_reps: usize) -> Self {
        Self { num_reps }
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_peripheral_connected(&self, address: &str) {
        print_success(&format!("Connected to {}", address.cyan()));
    }

    fn on_gesture_prompt(&self, set: usize, _gesture_index: usize, gesture: &str) {
        println!(
            "\n{} Set {}: make a {} gesture and hold it",
            "▶".blue().bold(),
            set + 1,
            gesture.bold().yellow()
        );
    }

    fn on_gesture_recorded(&self, gesture: &str, collected: usize) {
        print!("\r  {} {}/{}", gesture, collected, self.num_reps);
        if collected == self.num_reps {
            println!(" {}", "done".green());
        }
        let _ = std::io::stdout().flush();
    }

    fn on_checkpoint(&self, checkpoint: &Checkpoint) {
        println!(
            "  epoch {:>5}  loss {:>10.4}  accuracy {}",
            checkpoint.epoch,
            checkpoint.validation_loss,
            color_accuracy(checkpoint.validation_accuracy)
        );
    }
}

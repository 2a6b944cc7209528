use crate::{cli::OutputFormat, error::Result};
#[cfg(feature = "colored-output")]
use colored::*;
use leslies_pool::{CoordinatorState, FetchOutcome, Measurement, SensorData};
use serde_json::{Value, json};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_sensor_data(&self, data: &SensorData, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_pretty(data)),
            OutputFormat::Json => self.format_json(&self.sensor_json(data), true),
            OutputFormat::JsonCompact => self.format_json(&self.sensor_json(data), false),
        }
    }

    pub fn format_state(&self, state: &CoordinatorState, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_state_pretty(state)),
            OutputFormat::Json => self.format_json(&self.state_json(state), true),
            OutputFormat::JsonCompact => self.format_json(&self.state_json(state), false),
        }
    }

    fn sensor_json(&self, data: &SensorData) -> Value {
        json!({
            "status": "ok",
            "source": source_label(&data.outcome),
            "fields": data.to_fields(),
        })
    }

    fn state_json(&self, state: &CoordinatorState) -> Value {
        json!({
            "status": if state.last_update_success { "ok" } else { "error" },
            "last_updated": state.last_updated,
            "last_error": state.last_error,
            "source": state.data.as_ref().map(|d| source_label(&d.outcome)),
            "fields": state.data.as_ref().map(SensorData::to_fields),
        })
    }

    fn format_json(&self, value: &Value, pretty: bool) -> Result<String> {
        if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(Into::into)
    }

    fn format_pretty(&self, data: &SensorData) -> String {
        let mut output = String::new();

        let Some(reading) = data.outcome.reading() else {
            output.push_str(&self.colorize(
                "No water test data available",
                &Color::Yellow,
                true,
            ));
            output.push('\n');
            return output;
        };

        output.push_str(&self.colorize("Water Test:", &Color::Green, true));
        output.push('\n');

        if let FetchOutcome::Cached { fetched_at, .. } = &data.outcome {
            output.push_str(&format!(
                "  {}\n",
                self.colorize(
                    &format!("(cached, fetched {})", fetched_at.format("%Y-%m-%d %H:%M:%S UTC")),
                    &Color::Yellow,
                    false
                )
            ));
        }

        let width = Measurement::ALL
            .iter()
            .map(|m| m.display_name().len())
            .max()
            .unwrap_or(0);
        for measurement in Measurement::ALL {
            output.push_str(&format!(
                "  {}  {} {}\n",
                self.label(measurement.display_name(), width),
                self.colorize(reading.get(measurement), &Color::Cyan, false),
                measurement.unit(),
            ));
        }

        output.push_str(&format!(
            "  {}  {}\n",
            self.label("Leslies Last Tested", width),
            self.colorize(data.last_tested.as_deref().unwrap_or("unknown"), &Color::Cyan, false)
        ));
        output.push_str(&format!(
            "  {}  {}\n",
            self.label("Leslies In Store", width),
            self.colorize(if reading.in_store { "yes" } else { "no" }, &Color::Cyan, false)
        ));
        if let Some(timestamp) = data.test_timestamp {
            output.push_str(&format!(
                "  {}  {}\n",
                self.label("Test Timestamp", width),
                self.colorize(&timestamp.to_string(), &Color::Blue, false)
            ));
        }

        output
    }

    fn format_state_pretty(&self, state: &CoordinatorState) -> String {
        let mut output = String::new();
        let updated = state
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        output.push_str(&format!(
            "{} {}\n",
            self.colorize("Updated:", &Color::Green, true),
            updated
        ));

        if let Some(error) = &state.last_error {
            output.push_str(&format!(
                "{} {}\n",
                self.colorize("Last update failed:", &Color::Yellow, true),
                error
            ));
        }

        match &state.data {
            Some(data) => output.push_str(&self.format_pretty(data)),
            None => {
                output.push_str(&self.colorize("No data yet", &Color::Yellow, false));
                output.push('\n');
            }
        }
        output
    }

    /// Pads before colouring so escape codes do not count toward the width.
    fn label(&self, name: &str, width: usize) -> String {
        self.colorize(&format!("{name:<width$}"), &Color::Yellow, false)
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }
        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

fn source_label(outcome: &FetchOutcome) -> &'static str {
    match outcome {
        FetchOutcome::Fresh { .. } => "fresh",
        FetchOutcome::Cached { .. } => "cached",
        FetchOutcome::Empty => "empty",
    }
}

//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use sketchroom_core::Endpoint;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the endpoint rotation order
    ///
    /// With a pinned endpoint every attempt goes there, so it is listed
    /// first and the rotation is shown as inactive.
    pub fn print_endpoints(&self, candidates: &[Endpoint], pinned: Option<&Endpoint>) {
        match self.format {
            OutputFormat::Human => {
                if let Some(pinned) = pinned {
                    println!("* {} (override, used for every attempt)", pinned);
                    println!();
                    println!("Rotation (inactive while the override is set):");
                }
                for (index, endpoint) in candidates.iter().enumerate() {
                    println!("{:>3}  {}", index, endpoint);
                }
                println!("\n{} endpoint(s)", candidates.len());
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "override": pinned.map(ToString::to_string),
                        "endpoints": candidates.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    })
                );
            }
            OutputFormat::Quiet => match pinned {
                Some(pinned) => println!("{}", pinned),
                None => {
                    for endpoint in candidates {
                        println!("{}", endpoint);
                    }
                }
            },
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

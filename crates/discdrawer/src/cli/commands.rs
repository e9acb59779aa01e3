//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::catalog::NewDisc;
use crate::geo::Units;

/// Catalog commands.
#[derive(Debug, Subcommand)]
pub enum DiscCommand {
    /// Add a disc to the catalog
    Add(AddDiscArgs),

    /// Change fields of a disc; fields not given are kept
    Edit(EditDiscArgs),

    /// List catalog entries
    List {
        /// Only discs currently in the bag
        #[arg(long)]
        in_bag: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a disc and its measured throws
    Show {
        /// Catalog id of the disc
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove a disc and all of its throws
    Remove {
        /// Catalog id of the disc
        id: i64,
    },
}

/// Arguments for adding a disc.
#[derive(Debug, Args)]
pub struct AddDiscArgs {
    /// Mold name
    pub name: String,

    /// Manufacturer
    #[arg(short, long)]
    pub manufacturer: Option<String>,

    /// Plastic blend
    #[arg(short, long)]
    pub plastic: Option<String>,

    /// Disc type (e.g. "Putter", "Midrange", "Distance Driver")
    #[arg(short = 't', long = "type")]
    pub disc_type: Option<String>,

    /// Speed flight number
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub speed: f64,

    /// Glide flight number
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub glide: f64,

    /// Turn flight number
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub turn: f64,

    /// Fade flight number
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub fade: f64,

    /// Weight in grams
    #[arg(short, long)]
    pub weight: Option<i32>,

    /// Wear condition
    #[arg(long)]
    pub condition: Option<String>,

    /// Stability class
    #[arg(long)]
    pub stability: Option<String>,

    /// Mark the disc as in the bag
    #[arg(long)]
    pub in_bag: bool,
}

impl From<AddDiscArgs> for NewDisc {
    fn from(args: AddDiscArgs) -> Self {
        Self {
            name: args.name,
            manufacturer: args.manufacturer,
            plastic: args.plastic,
            disc_type: args.disc_type,
            speed: args.speed,
            glide: args.glide,
            turn: args.turn,
            fade: args.fade,
            weight: args.weight,
            condition: args.condition,
            stability: args.stability,
            in_bag: args.in_bag,
        }
    }
}

/// Arguments for editing a disc.
#[derive(Debug, Parser)]
pub struct EditDiscArgs {
    /// Catalog id of the disc
    pub id: i64,

    /// Mold name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Manufacturer
    #[arg(short, long)]
    pub manufacturer: Option<String>,

    /// Plastic blend
    #[arg(short, long)]
    pub plastic: Option<String>,

    /// Disc type
    #[arg(short = 't', long = "type")]
    pub disc_type: Option<String>,

    /// Speed flight number
    #[arg(long, allow_negative_numbers = true)]
    pub speed: Option<f64>,

    /// Glide flight number
    #[arg(long, allow_negative_numbers = true)]
    pub glide: Option<f64>,

    /// Turn flight number
    #[arg(long, allow_negative_numbers = true)]
    pub turn: Option<f64>,

    /// Fade flight number
    #[arg(long, allow_negative_numbers = true)]
    pub fade: Option<f64>,

    /// Weight in grams
    #[arg(short, long)]
    pub weight: Option<i32>,

    /// Wear condition
    #[arg(long)]
    pub condition: Option<String>,

    /// Stability class
    #[arg(long)]
    pub stability: Option<String>,

    /// Whether the disc is in the bag
    #[arg(long, value_name = "BOOL")]
    pub in_bag: Option<bool>,
}

impl EditDiscArgs {
    /// Overlay the given fields onto an existing disc's fields.
    #[must_use]
    pub fn apply(self, mut fields: NewDisc) -> NewDisc {
        if let Some(name) = self.name {
            fields.name = name;
        }
        if self.manufacturer.is_some() {
            fields.manufacturer = self.manufacturer;
        }
        if self.plastic.is_some() {
            fields.plastic = self.plastic;
        }
        if self.disc_type.is_some() {
            fields.disc_type = self.disc_type;
        }
        fields.speed = self.speed.unwrap_or(fields.speed);
        fields.glide = self.glide.unwrap_or(fields.glide);
        fields.turn = self.turn.unwrap_or(fields.turn);
        fields.fade = self.fade.unwrap_or(fields.fade);
        if self.weight.is_some() {
            fields.weight = self.weight;
        }
        if self.condition.is_some() {
            fields.condition = self.condition;
        }
        if self.stability.is_some() {
            fields.stability = self.stability;
        }
        fields.in_bag = self.in_bag.unwrap_or(fields.in_bag);
        fields
    }
}

/// Measure command arguments.
#[derive(Debug, Args)]
pub struct MeasureCommand {
    /// Catalog id of the disc being thrown
    pub disc_id: i64,

    /// Replay a recorded track instead of using the configured provider
    #[arg(long, value_name = "TRACK")]
    pub simulate: Option<PathBuf>,

    /// Interval between replayed track samples in milliseconds
    #[arg(long, requires = "simulate")]
    pub interval_ms: Option<u64>,

    /// Units for live output
    #[arg(short, long, value_enum)]
    pub units: Option<UnitsArg>,
}

/// Measured throw commands.
#[derive(Debug, Subcommand)]
pub enum ThrowsCommand {
    /// List measured throws, longest first
    List {
        /// Only throws with this disc
        #[arg(short, long)]
        disc: Option<i64>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete a measured throw
    Delete {
        /// Id of the throw
        id: i64,
    },
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to configuration file (uses default if not specified)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Distance units for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitsArg {
    /// International feet
    Feet,
    /// Meters
    Meters,
}

impl From<UnitsArg> for Units {
    fn from(arg: UnitsArg) -> Self {
        match arg {
            UnitsArg::Feet => Self::Feet,
            UnitsArg::Meters => Self::Meters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_args_into_new_disc() {
        let args = AddDiscArgs {
            name: "Zone".to_string(),
            manufacturer: Some("Discraft".to_string()),
            plastic: None,
            disc_type: Some("Putter".to_string()),
            speed: 4.0,
            glide: 3.0,
            turn: 0.0,
            fade: 3.0,
            weight: Some(174),
            condition: None,
            stability: Some("Overstable".to_string()),
            in_bag: true,
        };
        let disc = NewDisc::from(args);
        assert_eq!(disc.name, "Zone");
        assert_eq!(disc.weight, Some(174));
        assert_eq!(disc.fade, 3.0);
        assert!(disc.in_bag);
    }

    #[test]
    fn test_edit_args_overlay_only_given_fields() {
        let existing = NewDisc {
            name: "Buzzz".to_string(),
            manufacturer: Some("Discraft".to_string()),
            plastic: Some("ESP".to_string()),
            speed: 5.0,
            glide: 4.0,
            turn: -1.0,
            fade: 1.0,
            weight: Some(177),
            in_bag: true,
            ..NewDisc::default()
        };
        let edit = EditDiscArgs {
            id: 1,
            name: None,
            manufacturer: None,
            plastic: Some("Z".to_string()),
            disc_type: None,
            speed: None,
            glide: None,
            turn: Some(0.0),
            fade: None,
            weight: None,
            condition: Some("Beat".to_string()),
            stability: None,
            in_bag: Some(false),
        };

        let updated = edit.apply(existing.clone());
        assert_eq!(updated.plastic.as_deref(), Some("Z"));
        assert_eq!(updated.turn, 0.0);
        assert_eq!(updated.condition.as_deref(), Some("Beat"));
        assert!(!updated.in_bag);
        assert_eq!(updated.name, existing.name);
        assert_eq!(updated.manufacturer, existing.manufacturer);
        assert_eq!(updated.speed, existing.speed);
        assert_eq!(updated.weight, existing.weight);
    }

    #[test]
    fn test_units_arg_conversion() {
        assert_eq!(Units::from(UnitsArg::Feet), Units::Feet);
        assert_eq!(Units::from(UnitsArg::Meters), Units::Meters);
    }
}

use crate::lower::SelectMode;
use clap::ValueEnum;

/// What happens to records matching the filters
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum Mode {
    Include, // keep matching records, drop the rest
    Exclude, // drop matching records
}

impl From<Mode> for SelectMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Include => SelectMode::Include,
            Mode::Exclude => SelectMode::Exclude,
        }
    }
}

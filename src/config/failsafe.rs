use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pathset::{Error, Path, PathSet, Value};

/// Behaviour of the emergency landing when altitude can no longer be estimated
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Procedure {
    /// Idle throttle
    Drop,
    /// Fixed failsafe throttle
    Land,
}

impl FromStr for Procedure {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, ()> {
        match string {
            "drop" => Ok(Self::Drop),
            "land" => Ok(Self::Land),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Failsafe {
    pub procedure: Procedure,
}

impl Default for Failsafe {
    fn default() -> Self {
        Self { procedure: Procedure::Land }
    }
}

impl PathSet for Failsafe {
    fn set(&mut self, mut path: Path, value: Value) -> Result<(), Error> {
        match path.str()? {
            "procedure" => self.procedure = value.parse()?,
            _ => return Err(Error::UnknownPath),
        }
        Ok(())
    }
}

use core::str::{FromStr, Split};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Error {
    UnknownPath,
    ExpectValue,
    InvalidValue,
    /// A value is parseable but inconsistent with the rest of the configuration
    OutOfRange(&'static str),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Value<'a>(pub Option<&'a str>);

impl<'a> Value<'a> {
    pub fn of(string: &'a str) -> Value<'a> {
        Value(Some(string))
    }

    pub fn parse<T: FromStr>(&self) -> Result<T, Error> {
        match self.0 {
            Some(s) => FromStr::from_str(s).map_err(|_| Error::InvalidValue),
            None => Err(Error::ExpectValue),
        }
    }

    pub fn parse_or<T: FromStr>(&self, or: T) -> Result<T, Error> {
        match self.0 {
            Some(s) => FromStr::from_str(s).map_err(|_| Error::InvalidValue),
            None => Ok(or),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::UnknownPath => write!(f, "Specified path not exists or invalid"),
            Self::ExpectValue => write!(f, "Expect value"),
            Self::InvalidValue => write!(f, "Value not valid"),
            Self::OutOfRange(path) => write!(f, "Value of {} out of range", path),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Path<'a>(Split<'a, char>);

impl<'a> Path<'a> {
    pub fn new(split: Split<'a, char>) -> Self {
        Self(split)
    }

    pub fn str(&mut self) -> Result<&'a str, Error> {
        self.0.next().ok_or(Error::UnknownPath)
    }
}

impl<'a> From<&'a str> for Path<'a> {
    fn from(path: &'a str) -> Self {
        Self(path.split('.'))
    }
}

pub trait PathSet {
    fn set(&mut self, path: Path, value: Value) -> Result<(), Error>;
}

mod test {
    #[test]
    fn test_value_parse() {
        use super::{Error, Value};

        assert_eq!(Value::of("12").parse::<u16>(), Ok(12));
        assert_eq!(Value::of("x").parse::<u16>(), Err(Error::InvalidValue));
        assert_eq!(Value(None).parse::<u16>(), Err(Error::ExpectValue));
        assert_eq!(Value(None).parse_or(true), Ok(true));
    }

    #[test]
    fn test_path_split() {
        use super::Path;

        let mut path = Path::from("mc.braking.timeout");
        assert_eq!(path.str(), Ok("mc"));
        assert_eq!(path.str(), Ok("braking"));
        assert_eq!(path.str(), Ok("timeout"));
        assert!(path.str().is_err());
    }
}

//! CLI configuration
//!
//! Manual single-dash flag parsing, matching both the spec's CLI convention
//! (`-infile`, `-thresh`, ...) and the teacher crate's hand-rolled flag
//! parser: no argument-parsing crate, just a loop over `std::env::args()`
//! with one small helper per value type.

use crate::ensemble::MeanMode;
use crate::error::BmatrixError;

/// Parsed, validated run configuration (§6).
#[derive(Clone, Debug)]
pub struct Config {
    pub infile: String,
    pub varname: String,
    pub thresh: f64,
    pub dfact: usize,
    pub opref: String,
    pub mean_mode: MeanMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            infile: "Tmerged17.nc".into(),
            varname: "T".into(),
            thresh: 0.95,
            dfact: 8,
            opref: "Bmatrix".into(),
            mean_mode: MeanMode::Anomaly,
        }
    }
}

impl Config {
    /// Parse from an argv-style slice (excluding argv[0]).
    pub fn parse(args: &[String]) -> Result<Self, BmatrixError> {
        let mut cfg = Config::default();
        let mut mean_mode_overridden = false;

        let mut it = args.iter();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-infile" => cfg.infile = next_value(&mut it, "-infile")?,
                "-varname" => cfg.varname = next_value(&mut it, "-varname")?,
                "-thresh" => cfg.thresh = parse_f64(&next_value(&mut it, "-thresh")?, "-thresh")?,
                "-dfact" => cfg.dfact = parse_usize(&next_value(&mut it, "-dfact")?, "-dfact")?,
                "-opref" => cfg.opref = next_value(&mut it, "-opref")?,
                "-meanmode" => {
                    let code = parse_u32(&next_value(&mut it, "-meanmode")?, "-meanmode")?;
                    cfg.mean_mode = MeanMode::from_code(code)?;
                    mean_mode_overridden = true;
                }
                other => {
                    return Err(BmatrixError::Argument(format!("unrecognised flag {other:?}")));
                }
            }
        }

        cfg.validate(mean_mode_overridden)?;
        Ok(cfg)
    }

    fn validate(&self, mean_mode_overridden: bool) -> Result<(), BmatrixError> {
        if self.dfact < 1 {
            return Err(BmatrixError::Argument("-dfact must be >= 1".into()));
        }
        if !self.thresh.is_finite() {
            return Err(BmatrixError::Argument("-thresh must be finite".into()));
        }
        if self.infile.is_empty() {
            return Err(BmatrixError::Argument("-infile must not be empty".into()));
        }
        // Only mode 2 is numerically correct for the kernel's zero-mean
        // variance formula (§6/§9); modes 1/3 require an explicit override.
        if !self.mean_mode.is_anomaly_compatible() && !mean_mode_overridden {
            return Err(BmatrixError::Argument(
                "mean mode must be explicitly overridden with -meanmode to use anything but mode 2".into(),
            ));
        }
        Ok(())
    }
}

fn next_value(it: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String, BmatrixError> {
    it.next()
        .cloned()
        .ok_or_else(|| BmatrixError::Argument(format!("{flag} requires a value")))
}

fn parse_f64(s: &str, flag: &str) -> Result<f64, BmatrixError> {
    s.parse()
        .map_err(|_| BmatrixError::Argument(format!("{flag} expects a float, got {s:?}")))
}

fn parse_usize(s: &str, flag: &str) -> Result<usize, BmatrixError> {
    s.parse()
        .map_err(|_| BmatrixError::Argument(format!("{flag} expects a positive integer, got {s:?}")))
}

fn parse_u32(s: &str, flag: &str) -> Result<u32, BmatrixError> {
    s.parse()
        .map_err(|_| BmatrixError::Argument(format!("{flag} expects an integer, got {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::parse(&[]).unwrap();
        assert_eq!(cfg.infile, "Tmerged17.nc");
        assert_eq!(cfg.varname, "T");
        assert_eq!(cfg.thresh, 0.95);
        assert_eq!(cfg.dfact, 8);
        assert_eq!(cfg.opref, "Bmatrix");
        assert_eq!(cfg.mean_mode, MeanMode::Anomaly);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::parse(&args(&[
            "-infile", "foo.nc", "-varname", "Q", "-thresh", "0.8", "-dfact", "2", "-opref", "out",
        ]))
        .unwrap();
        assert_eq!(cfg.infile, "foo.nc");
        assert_eq!(cfg.varname, "Q");
        assert_eq!(cfg.thresh, 0.8);
        assert_eq!(cfg.dfact, 2);
        assert_eq!(cfg.opref, "out");
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Config::parse(&args(&["-bogus", "1"])).is_err());
    }

    #[test]
    fn non_anomaly_mode_requires_explicit_override() {
        assert!(Config::parse(&args(&["-meanmode", "3"])).is_ok());
        assert!(Config::parse(&args(&["-meanmode", "9"])).is_err());
    }

    #[test]
    fn dfact_zero_is_rejected() {
        assert!(Config::parse(&args(&["-dfact", "0"])).is_err());
    }
}

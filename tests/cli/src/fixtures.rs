//! Known values and external fixtures used by the scenarios.

use std::path::PathBuf;

/// Content added by the add scenarios.
pub const HELLO_WORLD: &str = "hello world";

/// CIDv0 of [`HELLO_WORLD`] with default import settings.
pub const HELLO_WORLD_CID_V0: &str = "Qmf412jQZiuVUtdgnB36FXFX7xg5V6KEbSJ4dpQuhkLyfD";

/// CIDv1 (raw leaves) of [`HELLO_WORLD`].
pub const HELLO_WORLD_CID_V1: &str = "bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e";

/// CAR fixture for the byte-range scenario.
///
/// The file inside is large, so the fixture is not vendored; point
/// `RANGE_FIXTURE_CAR`, `RANGE_FIXTURE_ROOT_CID` and `RANGE_FIXTURE_FILE_CID`
/// at a local copy.
#[derive(Debug, Clone)]
pub struct RangeFixture {
    /// Path to the `.car` file.
    pub car: PathBuf,
    /// Root CID of the CAR.
    pub root_cid: String,
    /// CID of the file served through the gateway.
    pub file_cid: String,
}

impl RangeFixture {
    /// Requested range.
    pub const RANGE: &'static str = "bytes=1276-1279";
    /// Expected `Content-Range` header.
    pub const CONTENT_RANGE: &'static str = "bytes 1276-1279/109266405";
    /// Expected body.
    pub const BODY: &'static str = "iana";

    /// Read the fixture location from the environment. Errors name the
    /// first variable that is unset or blank.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format!("{name} must point at the range fixture"))
        };
        Ok(Self {
            car: PathBuf::from(var("RANGE_FIXTURE_CAR")?),
            root_cid: var("RANGE_FIXTURE_ROOT_CID")?,
            file_cid: var("RANGE_FIXTURE_FILE_CID")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_fixture_names_missing_variable() {
        let err = RangeFixture::from_lookup(|_| None).unwrap_err();
        assert!(err.contains("RANGE_FIXTURE_CAR"), "{err}");

        let partial = RangeFixture::from_lookup(|name| match name {
            "RANGE_FIXTURE_CAR" => Some("/tmp/fixture.car".into()),
            "RANGE_FIXTURE_ROOT_CID" => Some("  ".into()),
            _ => Some("bafyfile".into()),
        });
        assert!(partial.unwrap_err().contains("RANGE_FIXTURE_ROOT_CID"));

        let full = RangeFixture::from_lookup(|name| Some(format!("{name}-value"))).unwrap();
        assert_eq!(full.car, PathBuf::from("RANGE_FIXTURE_CAR-value"));
        assert_eq!(full.file_cid, "RANGE_FIXTURE_FILE_CID-value");
    }
}

//! Bucket naming grammar: `<index>_<newestEpoch>_<oldestEpoch>_<uniqueId>`.

use crate::error::BucketNameError;
use crate::types::Bucket;

/// Number of `_`-separated fields in a bucket name. The last field keeps any
/// further underscores.
const NAME_FIELDS: usize = 4;

/// Decodes a bucket directory name (or the bucket segment of an object key).
///
/// The name is split on `_` into at most four fields. Fields 2 and 3 must be
/// base-10 integers; the unique id is taken verbatim, empty included.
pub fn parse(name: &str) -> Result<Bucket, BucketNameError> {
    let fields: Vec<&str> = name.splitn(NAME_FIELDS, '_').collect();
    if fields.len() < NAME_FIELDS {
        return Err(BucketNameError::MalformedName(name.to_string()));
    }

    let newest_epoch = parse_epoch(name, fields[1])?;
    let oldest_epoch = parse_epoch(name, fields[2])?;

    Ok(Bucket {
        index: fields[0].to_string(),
        newest_epoch,
        oldest_epoch,
        unique_id: fields[3].to_string(),
        raw_name: name.to_string(),
    })
}

fn parse_epoch(name: &str, field: &str) -> Result<i64, BucketNameError> {
    field.parse::<i64>().map_err(|_| BucketNameError::InvalidEpoch {
        name: name.to_string(),
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recovers_all_fields() {
        let bucket = parse("wineventlog_1640995200_1609459200_1234567890").unwrap();
        assert_eq!(bucket.index, "wineventlog");
        assert_eq!(bucket.newest_epoch, 1640995200);
        assert_eq!(bucket.oldest_epoch, 1609459200);
        assert_eq!(bucket.unique_id, "1234567890");
        assert_eq!(bucket.raw_name, "wineventlog_1640995200_1609459200_1234567890");
    }

    #[test]
    fn test_parse_keeps_underscores_in_unique_id() {
        let bucket = parse("db_200_100_3_ABCD-EF_x").unwrap();
        assert_eq!(bucket.index, "db");
        assert_eq!(bucket.unique_id, "3_ABCD-EF_x");
    }

    #[test]
    fn test_parse_accepts_empty_unique_id() {
        let bucket = parse("db_200_100_").unwrap();
        assert_eq!(bucket.unique_id, "");
        assert_eq!(bucket.oldest_epoch, 100);
    }

    #[test]
    fn test_parse_rejects_short_names() {
        for name in [
            "invalid_bucket",
            "wineventlog_1609459200",
            "wineventlog",
            "wineventlog_1609459200_1609459200",
        ] {
            assert_eq!(
                parse(name),
                Err(BucketNameError::MalformedName(name.to_string())),
                "{name}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_non_integer_epochs() {
        let err = parse("wineventlog_invalid_epoch_1234567890").unwrap_err();
        assert!(matches!(err, BucketNameError::InvalidEpoch { ref field, .. } if field == "invalid"));

        let err = parse("wineventlog_1609459200_invalid_epoch_1234567890").unwrap_err();
        assert!(matches!(err, BucketNameError::InvalidEpoch { ref field, .. } if field == "invalid"));
    }

    #[test]
    fn test_parse_many_generated_names() {
        for (n, o) in [(0i64, 0i64), (1, 2), (1700000000, 1500000000), (-5, 7)] {
            let name = format!("idx_{}_{}_u{}", n, o, n);
            let bucket = parse(&name).unwrap();
            assert_eq!((bucket.newest_epoch, bucket.oldest_epoch), (n, o));
            assert_eq!(bucket.unique_id, format!("u{}", n));
        }
    }
}

//! Key encoding for the physical schema (§4.3/§4.4).
//!
//! Row keys and super-column keys join two string components with a reserved
//! delimiter. The delimiter is the ASCII Unit Separator (`0x1F`), not the
//! printable `"__"` of the design this was distilled from — `0x1F` cannot
//! appear inside a valid component, so prefix slicing by `rel_type` can never
//! collide with a differently-named `rel_type`, regardless of underscores.

use crate::error::{Result, UsageError};

pub const SEP: char = '\u{1f}';

/// Smallest char greater than [`SEP`]; the exclusive upper bound of a
/// `rel_type`-prefixed slice (§4.4).
pub const SEP_NEXT: char = '\u{20}';

/// Validate a `type`/`key`/`rel_type`/`rel_key` component: non-empty and free
/// of the reserved delimiter.
pub fn validate_component(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(UsageError::InvalidComponent {
            component: value.to_string(),
            reason: "must not be empty",
        }
        .into());
    }
    if value.contains(SEP) {
        return Err(UsageError::InvalidComponent {
            component: value.to_string(),
            reason: "must not contain the reserved delimiter (U+001F)",
        }
        .into());
    }
    Ok(())
}

/// `"{type}<SEP>{key}"` — used as a row key for adjacency and pair-index
/// tables, naming one endpoint of a relationship.
pub fn endpoint_key(node_type: &str, key: &str) -> String {
    format!("{node_type}{SEP}{key}")
}

/// `"{rel_type}<SEP>{rel_key}"` — used as a super-column key in the
/// adjacency tables.
pub fn relationship_super_key(rel_type: &str, rel_key: &str) -> String {
    format!("{rel_type}{SEP}{rel_key}")
}

/// `[start, end)` bounds for slicing all super-columns of a given
/// `rel_type` out of an adjacency row (§4.4).
pub fn rel_type_slice_bounds(rel_type: &str) -> (String, String) {
    (format!("{rel_type}{SEP}"), format!("{rel_type}{SEP_NEXT}"))
}

/// `[start, end)` bounds that cover every super-column in a row, regardless
/// of `rel_type` — used where the whole adjacency row must be read (§4.8,
/// §4.9), as opposed to one type's slice (§4.4).
pub fn full_row_slice_bounds() -> (String, String) {
    (String::new(), '\u{10ffff}'.to_string())
}

/// Split a `"{rel_type}<SEP>{rel_key}"` super-column key back into its parts.
pub fn split_relationship_super_key(super_key: &str) -> Option<(&str, &str)> {
    super_key.split_once(SEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_delimiter_and_empty() {
        assert!(validate_component("").is_err());
        assert!(validate_component("has\u{1f}sep").is_err());
        assert!(validate_component("friend_of").is_ok());
        assert!(validate_component("friend_").is_ok());
    }

    #[test]
    fn slice_bounds_do_not_collide_on_shared_prefix() {
        let (start, end) = rel_type_slice_bounds("friend");
        let friend_key = relationship_super_key("friend", "abc");
        let friendly_key = relationship_super_key("friendly", "abc");
        let frien_key = relationship_super_key("frien", "abc");

        assert!(friend_key.as_str() >= start.as_str() && friend_key.as_str() < end.as_str());
        assert!(!(friendly_key.as_str() >= start.as_str() && friendly_key.as_str() < end.as_str()));
        assert!(!(frien_key.as_str() >= start.as_str() && frien_key.as_str() < end.as_str()));
    }
}

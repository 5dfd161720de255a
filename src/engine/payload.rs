//! Builds and parses the adjacency super-column payload (§4.3/§4.5) and the
//! pair-index marker (§4.3/§4.10).
//!
//! The payload is the same `ColumnMap` written under the same super-column
//! key into both the outbound row of the source and the inbound row of the
//! target (§4.5 steps 5-6) — this module is the single place that knows its
//! shape, so both write sites and both read sites agree by construction.

use crate::error::{Result, UsageError};
use crate::key::SEP;
use crate::model::{Direction, NodeKey, PropertyMap, RelationshipKey, RelationshipRecord, Value};
use crate::storage::ColumnMap;

const COL_REL_TYPE: &str = "rel_type";
const COL_REL_KEY: &str = "rel_key";
const SOURCE_PREFIX: &str = "source__";
const TARGET_PREFIX: &str = "target__";
const COL_SOURCE_TYPE: &str = "source__type";
const COL_SOURCE_KEY: &str = "source__key";
const COL_TARGET_TYPE: &str = "target__type";
const COL_TARGET_KEY: &str = "target__key";

const OUTGOING_MARKER: &str = "outgoing";
const INCOMING_MARKER: &str = "incoming";

/// An attribute name that would collide with a reserved payload column.
fn reject_reserved(attrs: &PropertyMap) -> Result<()> {
    for name in attrs.keys() {
        if name == COL_REL_TYPE
            || name == COL_REL_KEY
            || name.starts_with(SOURCE_PREFIX)
            || name.starts_with(TARGET_PREFIX)
        {
            return Err(UsageError::InvalidComponent {
                component: name.clone(),
                reason: "attribute name collides with a reserved adjacency column",
            }
            .into());
        }
    }
    Ok(())
}

fn encode_attrs(dst: &mut ColumnMap, prefix: &str, attrs: &PropertyMap) -> Result<()> {
    for (name, value) in attrs {
        dst.insert(format!("{prefix}{name}"), value.encode()?);
    }
    Ok(())
}

fn decode_attrs(src: &ColumnMap, prefix: &str) -> Result<PropertyMap> {
    let mut out = PropertyMap::new();
    for (col, raw) in src {
        if let Some(attr) = col.strip_prefix(prefix) {
            if attr == "type" || attr == "key" {
                continue;
            }
            out.insert(attr.to_string(), Value::decode(raw)?);
        }
    }
    Ok(out)
}

/// Build the full super-column payload for a relationship (§4.5 step 3-4).
///
/// Caller attributes are folded in first and never overwritten afterward —
/// the distilled design's bug was reassigning the accumulator after this
/// point, discarding them.
pub fn build(
    identity: &RelationshipKey,
    source: &NodeKey,
    source_attrs: &PropertyMap,
    target: &NodeKey,
    target_attrs: &PropertyMap,
    rel_attrs: &PropertyMap,
) -> Result<ColumnMap> {
    reject_reserved(rel_attrs)?;

    let mut columns = ColumnMap::new();
    for (name, value) in rel_attrs {
        columns.insert(name.clone(), value.encode()?);
    }

    columns.insert(COL_REL_TYPE.to_string(), identity.rel_type.clone());
    columns.insert(COL_REL_KEY.to_string(), identity.rel_key.clone());

    columns.insert(COL_SOURCE_TYPE.to_string(), source.node_type.clone());
    columns.insert(COL_SOURCE_KEY.to_string(), source.key.clone());
    encode_attrs(&mut columns, SOURCE_PREFIX, source_attrs)?;

    columns.insert(COL_TARGET_TYPE.to_string(), target.node_type.clone());
    columns.insert(COL_TARGET_KEY.to_string(), target.key.clone());
    encode_attrs(&mut columns, TARGET_PREFIX, target_attrs)?;

    Ok(columns)
}

/// Parse a super-column payload back into a [`RelationshipRecord`], given
/// which direction it was read from (which adjacency table the caller sliced).
pub fn parse(super_key: &str, columns: &ColumnMap, direction: Direction) -> Result<RelationshipRecord> {
    let (rel_type, rel_key) = crate::key::split_relationship_super_key(super_key)
        .map(|(t, k)| (t.to_string(), k.to_string()))
        .unwrap_or_else(|| {
            (
                columns.get(COL_REL_TYPE).cloned().unwrap_or_default(),
                columns.get(COL_REL_KEY).cloned().unwrap_or_default(),
            )
        });

    let source = NodeKey::new(
        columns.get(COL_SOURCE_TYPE).cloned().unwrap_or_default(),
        columns.get(COL_SOURCE_KEY).cloned().unwrap_or_default(),
    );
    let target = NodeKey::new(
        columns.get(COL_TARGET_TYPE).cloned().unwrap_or_default(),
        columns.get(COL_TARGET_KEY).cloned().unwrap_or_default(),
    );
    let source_attributes = decode_attrs(columns, SOURCE_PREFIX)?;
    let target_attributes = decode_attrs(columns, TARGET_PREFIX)?;

    let mut attributes = PropertyMap::new();
    for (col, raw) in columns {
        if col == COL_REL_TYPE
            || col == COL_REL_KEY
            || col.starts_with(SOURCE_PREFIX)
            || col.starts_with(TARGET_PREFIX)
        {
            continue;
        }
        attributes.insert(col.clone(), Value::decode(raw)?);
    }

    Ok(RelationshipRecord {
        identity: RelationshipKey::new(rel_type, rel_key),
        source,
        source_attributes,
        target,
        target_attributes,
        attributes,
        direction,
    })
}

/// Encode the pair-index marker value (§4.3 point 3, §4.10): which
/// relationship this is and which adjacency table to hydrate it from.
///
/// The distilled design joins these with the same printable `"__"` used for
/// super-column keys; this implementation uses the reserved non-printable
/// [`SEP`] throughout, so a `rel_type`/`rel_key` containing `_` can never be
/// misparsed (§4.4's fix applies here too).
pub fn encode_marker(rel_type: &str, rel_key: &str, direction: Direction) -> String {
    let marker = match direction {
        Direction::Outgoing => OUTGOING_MARKER,
        Direction::Incoming => INCOMING_MARKER,
    };
    format!("{rel_type}{SEP}{rel_key}{SEP}{marker}")
}

/// Reverse of [`encode_marker`].
pub fn decode_marker(raw: &str) -> Option<(String, String, Direction)> {
    let mut parts = raw.splitn(3, SEP);
    let rel_type = parts.next()?;
    let rel_key = parts.next()?;
    let marker = parts.next()?;
    let direction = match marker {
        OUTGOING_MARKER => Direction::Outgoing,
        INCOMING_MARKER => Direction::Incoming,
        _ => return None,
    };
    Some((rel_type.to_string(), rel_key.to_string(), direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property_map;

    #[test]
    fn round_trips_full_payload() {
        let identity = RelationshipKey::new("friend", "k1");
        let source = NodeKey::new("test_type", "spiderpig");
        let target = NodeKey::new("test_type", "cow");
        let source_attrs = property_map([("sound", "oink")]);
        let target_attrs = property_map([("sound", "moo")]);
        let rel_attrs = property_map([("best", false)]);

        let columns = build(&identity, &source, &source_attrs, &target, &target_attrs, &rel_attrs).unwrap();
        let record = parse("friend\u{1f}k1", &columns, Direction::Outgoing).unwrap();

        assert_eq!(record.identity, identity);
        assert_eq!(record.source, source);
        assert_eq!(record.target, target);
        assert_eq!(record.source_attributes, source_attrs);
        assert_eq!(record.target_attributes, target_attrs);
        assert_eq!(record.attributes, rel_attrs);
    }

    #[test]
    fn rejects_reserved_attribute_names() {
        let identity = RelationshipKey::new("friend", "k1");
        let a = NodeKey::new("t", "a");
        let b = NodeKey::new("t", "b");
        let bad = property_map([("source__sneaky", "x")]);
        assert!(build(&identity, &a, &PropertyMap::new(), &b, &PropertyMap::new(), &bad).is_err());
    }

    #[test]
    fn marker_round_trips_with_underscores_in_rel_type() {
        let raw = encode_marker("best_friend_", "k_1", Direction::Incoming);
        let (rel_type, rel_key, direction) = decode_marker(&raw).unwrap();
        assert_eq!(rel_type, "best_friend_");
        assert_eq!(rel_key, "k_1");
        assert_eq!(direction, Direction::Incoming);
    }
}

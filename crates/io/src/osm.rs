// OSM XML snapshot reading and JOSM-style change file writing.
//
// Only nodes and ways are kept; relations and anything else in the file are
// skipped. Attributes and tags keep their original order so a written change
// file diffs cleanly against the snapshot.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use posthours_recon::config::TagConfig;
use posthours_recon::model::{EntityKind, MapEntity, PendingEdit};

use crate::{read_to_string, write_atomic, IoError, Result};

/// One `<node>` or `<way>` with its tags and node refs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsmElement {
    pub kind: EntityKind,
    pub id: i64,
    attrs: Vec<(String, String)>,
    tags: Vec<(String, String)>,
    nodes: Vec<i64>,
}

impl OsmElement {
    fn from_start(kind: EntityKind, e: &BytesStart<'_>) -> Result<Self> {
        let attrs = read_attrs(e)?;
        let id = attrs
            .iter()
            .find(|(k, _)| k == "id")
            .and_then(|(_, v)| v.parse().ok())
            .ok_or_else(|| xml_err("osm", format!("{kind} without a numeric id")))?;
        Ok(Self {
            kind,
            id,
            attrs,
            tags: Vec::new(),
            nodes: Vec::new(),
        })
    }

    fn add_child(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let attrs = read_attrs(e)?;
        let get = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        match e.name().as_ref() {
            b"tag" => {
                if let (Some(k), Some(v)) = (get("k"), get("v")) {
                    self.tags.push((k, v));
                }
            }
            b"nd" => {
                if let Some(r) = get("ref").and_then(|r| r.parse().ok()) {
                    self.nodes.push(r);
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Tag value, treating an empty value as absent.
    fn non_empty_tag(&self, key: &str) -> Option<&str> {
        self.tag(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set_tag(&mut self, key: &str, value: &str) {
        match self.tags.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.tags.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove_tag(&mut self, key: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|(k, _)| k != key);
        self.tags.len() != before
    }

    /// Node refs of a way, in order. Empty for nodes.
    pub fn node_refs(&self) -> &[i64] {
        &self.nodes
    }

    pub fn is_modified(&self) -> bool {
        self.attr("action") == Some("modify")
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        let raw = self.attr("timestamp")?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!(element = %self.label(), timestamp = raw, error = %e, "ignoring bad timestamp");
                None
            }
        }
    }

    fn label(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let name = self.kind.to_string();
        let mut start = BytesStart::new(name.as_str());
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.tags.is_empty() && self.nodes.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(write_err)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(write_err)?;
        for r in &self.nodes {
            let mut nd = BytesStart::new("nd");
            nd.push_attribute(("ref", r.to_string().as_str()));
            writer.write_event(Event::Empty(nd)).map_err(write_err)?;
        }
        for (k, v) in &self.tags {
            let mut tag = BytesStart::new("tag");
            tag.push_attribute(("k", k.as_str()));
            tag.push_attribute(("v", v.as_str()));
            writer.write_event(Event::Empty(tag)).map_err(write_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(write_err)?;
        Ok(())
    }
}

/// The nodes and ways of an OSM XML file, in document order.
#[derive(Debug, Clone, Default)]
pub struct OsmDocument {
    elements: Vec<OsmElement>,
    index: HashMap<(EntityKind, i64), usize>,
}

impl OsmDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc = Self::default();
        let mut current: Option<OsmElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match element_kind(e) {
                    Some(kind) => current = Some(OsmElement::from_start(kind, e)?),
                    None => {
                        if let Some(el) = current.as_mut() {
                            el.add_child(e)?;
                        }
                    }
                },
                Ok(Event::Empty(ref e)) => match element_kind(e) {
                    Some(kind) => doc.push(OsmElement::from_start(kind, e)?),
                    None => {
                        if let Some(el) = current.as_mut() {
                            el.add_child(e)?;
                        }
                    }
                },
                Ok(Event::End(ref e)) if matches!(e.name().as_ref(), b"node" | b"way") => {
                    if let Some(el) = current.take() {
                        doc.push(el);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(xml_err(
                        "osm",
                        format!("at byte {}: {e}", reader.buffer_position()),
                    ))
                }
                _ => {}
            }
            buf.clear();
        }

        tracing::debug!(elements = doc.elements.len(), "parsed OSM document");
        Ok(doc)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = read_to_string(path)?;
        Self::parse(&xml).map_err(|e| match e {
            IoError::Xml { message, .. } => IoError::Xml {
                context: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    fn push(&mut self, el: OsmElement) {
        self.index.insert((el.kind, el.id), self.elements.len());
        self.elements.push(el);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, kind: EntityKind, id: i64) -> Option<&OsmElement> {
        self.index.get(&(kind, id)).map(|&i| &self.elements[i])
    }

    fn get_mut(&mut self, kind: EntityKind, id: i64) -> Option<&mut OsmElement> {
        let i = *self.index.get(&(kind, id))?;
        self.elements.get_mut(i)
    }

    /// Elements carrying a non-empty reference tag, as engine input.
    pub fn map_entities(&self, tags: &TagConfig) -> Vec<MapEntity> {
        self.elements
            .iter()
            .filter_map(|el| {
                let reference = el.non_empty_tag(&tags.reference)?;
                Some(MapEntity {
                    reference: reference.to_string(),
                    kind: el.kind,
                    id: el.id,
                    current_hours: el.non_empty_tag(&tags.hours).map(String::from),
                    covid_hours: el.non_empty_tag(&tags.covid_hours).map(String::from),
                    last_modified: el.last_modified(),
                })
            })
            .collect()
    }

    /// Apply pending edits and mark touched elements `action="modify"`.
    /// Returns how many edits found their element.
    pub fn apply_edits(&mut self, edits: &[PendingEdit], tags: &TagConfig) -> usize {
        let mut applied = 0;
        for edit in edits {
            let Some(el) = self.get_mut(edit.kind, edit.id) else {
                tracing::warn!(element = %format!("{}/{}", edit.kind, edit.id), reference = %edit.reference, "edit target not in snapshot");
                continue;
            };
            el.set_tag(&tags.hours, &edit.hours);
            if edit.remove_covid_hours && el.remove_tag(&tags.covid_hours) {
                tracing::debug!(element = %el.label(), "dropped COVID hours tag");
            }
            el.set_tag(&tags.reason, &edit.reason);
            el.set_attr("action", "modify");
            applied += 1;
        }
        applied
    }

    /// Modified elements, in document order, nodes before ways.
    pub fn modified(&self) -> impl Iterator<Item = &OsmElement> {
        self.elements.iter().filter(|el| el.is_modified())
    }

    /// Render a change file: modified elements plus the nodes that modified
    /// ways reference, so the ways stay drawable in an editor.
    pub fn to_change_xml(&self) -> Result<String> {
        let way_nodes: HashSet<i64> = self
            .modified()
            .filter(|el| el.kind == EntityKind::Way)
            .flat_map(|el| el.nodes.iter().copied())
            .collect();

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;

        let mut root = BytesStart::new("osm");
        root.push_attribute(("version", "0.6"));
        root.push_attribute(("upload", "true"));
        root.push_attribute(("generator", "posthours"));
        writer.write_event(Event::Start(root)).map_err(write_err)?;

        for kind in [EntityKind::Node, EntityKind::Way] {
            for el in self.elements.iter().filter(|el| el.kind == kind) {
                let wanted = el.is_modified()
                    || (kind == EntityKind::Node && way_nodes.contains(&el.id));
                if wanted {
                    el.write_to(&mut writer)?;
                }
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new("osm")))
            .map_err(write_err)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| xml_err("change file", e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Write the change file atomically. Returns the number of modified elements.
    pub fn write_changes(&self, path: &Path) -> Result<usize> {
        let xml = self.to_change_xml()?;
        write_atomic(path, xml.as_bytes())?;
        let count = self.modified().count();
        tracing::info!(path = %path.display(), modified = count, "wrote change file");
        Ok(count)
    }
}

fn element_kind(e: &BytesStart<'_>) -> Option<EntityKind> {
    match e.name().as_ref() {
        b"node" => Some(EntityKind::Node),
        b"way" => Some(EntityKind::Way),
        _ => None,
    }
}

fn read_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|err| xml_err("osm", format!("attribute {key}: {err}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn xml_err(context: &str, message: impl Into<String>) -> IoError {
    IoError::Xml {
        context: context.to_string(),
        message: message.into(),
    }
}

fn write_err(e: impl std::fmt::Display) -> IoError {
    xml_err("change file", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SNAPSHOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="overpass">
  <node id="1" lat="51.5" lon="-0.1" version="3" timestamp="2020-04-10T12:00:00Z">
    <tag k="amenity" v="post_office"/>
    <tag k="ref" v="PO1"/>
    <tag k="opening_hours" v="Mo-Fr 09:00-17:00"/>
    <tag k="opening_hours:covid19" v="Mo-Fr 10:00-13:00"/>
  </node>
  <node id="2" lat="51.6" lon="-0.2" version="1"/>
  <node id="3" lat="51.7" lon="-0.3" version="1"/>
  <node id="4" lat="51.8" lon="-0.4" version="1">
    <tag k="ref" v=""/>
  </node>
  <way id="10" version="2" timestamp="not a time">
    <nd ref="2"/>
    <nd ref="3"/>
    <tag k="ref" v="PO2"/>
    <tag k="name" v="Smith &amp; Sons"/>
  </way>
  <relation id="99">
    <member type="way" ref="10" role="outer"/>
    <tag k="ref" v="PO9"/>
  </relation>
</osm>
"#;

    fn tags() -> TagConfig {
        TagConfig::default()
    }

    fn edit(kind: EntityKind, id: i64, hours: &str, remove_covid_hours: bool) -> PendingEdit {
        PendingEdit {
            reference: "X".into(),
            kind,
            id,
            hours: hours.into(),
            reason: "add opening hours".into(),
            remove_covid_hours,
        }
    }

    #[test]
    fn parses_nodes_and_ways_skips_relations() {
        let doc = OsmDocument::parse(SNAPSHOT).unwrap();
        assert_eq!(doc.len(), 5);
        assert!(doc.get(EntityKind::Way, 10).is_some());
        assert_eq!(doc.get(EntityKind::Way, 10).unwrap().node_refs(), &[2, 3]);
        assert_eq!(doc.get(EntityKind::Way, 10).unwrap().tag("name"), Some("Smith & Sons"));
    }

    #[test]
    fn entities_from_reference_tag() {
        let doc = OsmDocument::parse(SNAPSHOT).unwrap();
        let entities = doc.map_entities(&tags());
        assert_eq!(entities.len(), 2);

        let po1 = &entities[0];
        assert_eq!(po1.reference, "PO1");
        assert_eq!(po1.label(), "node/1");
        assert_eq!(po1.current_hours.as_deref(), Some("Mo-Fr 09:00-17:00"));
        assert_eq!(po1.covid_hours.as_deref(), Some("Mo-Fr 10:00-13:00"));
        assert_eq!(po1.last_modified.unwrap().to_rfc3339(), "2020-04-10T12:00:00+00:00");

        let po2 = &entities[1];
        assert_eq!(po2.kind, EntityKind::Way);
        assert!(po2.current_hours.is_none());
        assert!(po2.last_modified.is_none());
    }

    #[test]
    fn apply_edits_sets_tags_and_action() {
        let mut doc = OsmDocument::parse(SNAPSHOT).unwrap();
        let edits = [
            edit(EntityKind::Node, 1, "Mo-Fr 09:00-17:00; PH off", true),
            edit(EntityKind::Way, 10, "Sa 09:00-12:00", false),
            edit(EntityKind::Node, 404, "Mo 09:00-10:00", false),
        ];
        assert_eq!(doc.apply_edits(&edits, &tags()), 2);

        let node = doc.get(EntityKind::Node, 1).unwrap();
        assert!(node.is_modified());
        assert_eq!(node.tag("opening_hours"), Some("Mo-Fr 09:00-17:00; PH off"));
        assert_eq!(node.tag("opening_hours:covid19"), None);
        assert_eq!(node.tag("fixme:hours_sync"), Some("add opening hours"));

        let way = doc.get(EntityKind::Way, 10).unwrap();
        assert_eq!(way.tag("opening_hours"), Some("Sa 09:00-12:00"));
        assert!(!doc.get(EntityKind::Node, 2).unwrap().is_modified());
    }

    #[test]
    fn change_file_holds_modified_elements_and_way_nodes() {
        let mut doc = OsmDocument::parse(SNAPSHOT).unwrap();
        doc.apply_edits(&[edit(EntityKind::Way, 10, "Sa 09:00-12:00", false)], &tags());

        let xml = doc.to_change_xml().unwrap();
        assert!(xml.contains(r#"<osm version="0.6" upload="true" generator="posthours">"#));
        assert!(xml.contains(r#"<way id="10""#));
        assert!(xml.contains(r#"action="modify""#));
        assert!(xml.contains(r#"<node id="2""#));
        assert!(xml.contains(r#"<node id="3""#));
        assert!(!xml.contains(r#"<node id="1""#));
        assert!(xml.contains("Smith &amp; Sons"));

        let back = OsmDocument::parse(&xml).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.modified().count(), 1);
        assert_eq!(
            back.get(EntityKind::Way, 10).unwrap().tag("name"),
            Some("Smith & Sons")
        );
    }

    #[test]
    fn no_edits_gives_empty_change_file() {
        let doc = OsmDocument::parse(SNAPSHOT).unwrap();
        let back = OsmDocument::parse(&doc.to_change_xml().unwrap()).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn write_changes_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.osm");
        let mut doc = OsmDocument::parse(SNAPSHOT).unwrap();
        doc.apply_edits(&[edit(EntityKind::Node, 1, "Mo 09:00-10:00", false)], &tags());

        assert_eq!(doc.write_changes(&path).unwrap(), 1);
        let back = OsmDocument::read(&path).unwrap();
        assert_eq!(
            back.get(EntityKind::Node, 1).unwrap().tag("opening_hours"),
            Some("Mo 09:00-10:00")
        );
    }

    #[test]
    fn missing_id_is_an_error() {
        let err = OsmDocument::parse(r#"<osm><node lat="1" lon="2"/></osm>"#).unwrap_err();
        assert!(matches!(err, IoError::Xml { .. }));
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        let err = OsmDocument::parse(r#"<osm><node id="1"></way></osm>"#).unwrap_err();
        assert!(matches!(err, IoError::Xml { .. }));
    }
}

//! Knots, stitches and gather points, and path resolution over them.

use std::collections::HashMap;
use std::fmt;

use plume_core::Uuid;
use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::error::{NavigationError, StoryResult, StructureError};

/// Index of a knot in its [`StoryContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KnotId(pub usize);

impl fmt::Display for KnotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "knot#{}", self.0)
    }
}

/// A knot parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, bound as a temporary.
    pub name: String,
    /// Reference parameters alias the caller's variable.
    #[serde(default)]
    pub by_ref: bool,
}

/// A top-level section of story content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    /// Name, unique across the story.
    pub name: String,
    /// Visit-count key.
    pub uuid: Uuid,
    /// Parameters bound on entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// The knot body followed by each stitch's body.
    pub objects: Content,
    /// Stitches, ordered by offset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stitches: Vec<Stitch>,
    /// Gathers in the knot body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gather_points: Vec<GatherPoint>,
    /// Functions run synchronously from expressions.
    #[serde(default)]
    pub is_function: bool,
}

/// A named sub-section of a knot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stitch {
    /// Name, unique within the knot.
    pub name: String,
    /// Visit-count key.
    pub uuid: Uuid,
    /// Index in the knot's objects where the stitch body starts.
    pub offset: usize,
    /// Gathers in the stitch body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gather_points: Vec<GatherPoint>,
}

/// A point where choice branches rejoin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatherPoint {
    /// Label; empty for anonymous gathers.
    pub name: String,
    /// Visit-count key.
    pub uuid: Uuid,
    /// Weave depth the gather closes.
    pub nesting_level: u16,
    /// Index of the choice object the gather follows. The gather's own
    /// content starts right after it.
    pub choice_index: usize,
}

impl GatherPoint {
    /// Index of the gather's first object.
    pub fn start(&self) -> usize {
        self.choice_index + 1
    }
}

impl Knot {
    /// End of the knot body proper, before its first stitch.
    pub fn body_end(&self) -> usize {
        self.stitches
            .first()
            .map_or(self.objects.len(), |s| s.offset)
    }

    /// End of the segment (knot body or stitch body) containing `index`.
    pub fn segment_end(&self, index: usize) -> usize {
        self.stitches
            .iter()
            .map(|s| s.offset)
            .find(|&offset| offset > index)
            .unwrap_or(self.objects.len())
    }

    /// Look up a stitch by name.
    pub fn stitch(&self, name: &str) -> Option<usize> {
        self.stitches.iter().position(|s| s.name == name)
    }

    /// All gather points, knot body first.
    pub fn all_gathers(&self) -> impl Iterator<Item = &GatherPoint> {
        self.gather_points
            .iter()
            .chain(self.stitches.iter().flat_map(|s| s.gather_points.iter()))
    }

    /// The gather whose content starts at `index`.
    pub fn gather_starting_at(&self, index: usize) -> Option<&GatherPoint> {
        self.all_gathers().find(|g| g.start() == index)
    }

    fn named_gather<'a>(gathers: &'a [GatherPoint], name: &str) -> Option<&'a GatherPoint> {
        if name.is_empty() {
            return None;
        }
        gathers.iter().find(|g| g.name == name)
    }
}

/// Something a path can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// A whole knot.
    Knot(KnotId),
    /// A stitch: knot and stitch index.
    Stitch(KnotId, usize),
    /// A gather, identified by its uuid.
    Gather(KnotId, Uuid),
}

impl Address {
    /// The knot the address lies in.
    pub fn knot(self) -> KnotId {
        match self {
            Address::Knot(k) | Address::Stitch(k, _) | Address::Gather(k, _) => k,
        }
    }
}

/// Where execution lands after a divert.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Location {
    pub knot: KnotId,
    pub start: usize,
    pub end: usize,
    /// Nodes entered, in order.
    pub visits: Vec<Uuid>,
    /// Set when the location is a gather, whose arrival is already counted.
    pub gather_start: Option<usize>,
}

/// Every knot of a story, addressable by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Knot>", into = "Vec<Knot>")]
pub struct StoryContent {
    knots: Vec<Knot>,
    by_name: HashMap<String, KnotId>,
}

impl StoryContent {
    /// Index and check `knots`.
    pub fn new(knots: Vec<Knot>) -> Result<Self, StructureError> {
        let mut by_name = HashMap::new();
        for (index, knot) in knots.iter().enumerate() {
            if by_name.insert(knot.name.clone(), KnotId(index)).is_some() {
                return Err(StructureError::DuplicateKnot(knot.name.clone()));
            }
            validate(knot)?;
        }
        Ok(Self { knots, by_name })
    }

    /// Load from JSON.
    pub fn from_json(json: &str) -> StoryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write as JSON.
    pub fn to_json(&self) -> StoryResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// All knots in table order.
    pub fn knots(&self) -> &[Knot] {
        &self.knots
    }

    /// Look up a knot by id.
    pub fn knot(&self, id: KnotId) -> Option<&Knot> {
        self.knots.get(id.0)
    }

    /// Look up a knot id by name.
    pub fn knot_id(&self, name: &str) -> Option<KnotId> {
        self.by_name.get(name).copied()
    }

    /// The first knot that is not a function.
    pub fn first_knot(&self) -> Option<KnotId> {
        self.knots.iter().position(|k| !k.is_function).map(KnotId)
    }

    /// Resolve a dotted path. Single names are looked up in the `current`
    /// knot before the knot table.
    pub fn resolve(&self, path: &str, current: Option<KnotId>) -> StoryResult<Address> {
        let segments: Vec<&str> = path.split('.').collect();
        let address = match segments.as_slice() {
            [name] => current
                .and_then(|id| self.local(id, name))
                .or_else(|| self.knot_id(name).map(Address::Knot)),
            [outer, inner] => self
                .knot_id(outer)
                .and_then(|id| self.local(id, inner))
                .or_else(|| {
                    let id = current?;
                    let knot = self.knot(id)?;
                    let stitch = &knot.stitches[knot.stitch(outer)?];
                    Knot::named_gather(&stitch.gather_points, inner)
                        .map(|g| Address::Gather(id, g.uuid))
                }),
            [knot, stitch, gather] => self.knot_id(knot).and_then(|id| {
                let knot = self.knot(id)?;
                let stitch = &knot.stitches[knot.stitch(stitch)?];
                Knot::named_gather(&stitch.gather_points, gather)
                    .map(|g| Address::Gather(id, g.uuid))
            }),
            _ => return Err(StructureError::PathTooDeep(path.to_string()).into()),
        };
        address.ok_or_else(|| NavigationError::UnknownTarget(path.to_string()).into())
    }

    /// A stitch or body gather of knot `id` named `name`.
    fn local(&self, id: KnotId, name: &str) -> Option<Address> {
        let knot = self.knot(id)?;
        if let Some(index) = knot.stitch(name) {
            return Some(Address::Stitch(id, index));
        }
        Knot::named_gather(&knot.gather_points, name).map(|g| Address::Gather(id, g.uuid))
    }

    /// The visit-count key of an address.
    pub fn uuid_of(&self, address: Address) -> Option<Uuid> {
        let knot = self.knot(address.knot())?;
        match address {
            Address::Knot(_) => Some(knot.uuid),
            Address::Stitch(_, index) => knot.stitches.get(index).map(|s| s.uuid),
            Address::Gather(_, uuid) => Some(uuid),
        }
    }

    /// Where a divert to `address` lands. A knot with an empty body enters
    /// its first stitch.
    pub(crate) fn locate(&self, address: Address) -> StoryResult<Location> {
        let knot_id = address.knot();
        let knot = self
            .knot(knot_id)
            .ok_or_else(|| NavigationError::UnknownTarget(knot_id.to_string()))?;
        let location = match address {
            Address::Knot(_) => {
                let end = knot.body_end();
                match knot.stitches.first() {
                    Some(first) if end == 0 => Location {
                        knot: knot_id,
                        start: first.offset,
                        end: knot.segment_end(first.offset),
                        visits: vec![knot.uuid, first.uuid],
                        gather_start: None,
                    },
                    _ => Location {
                        knot: knot_id,
                        start: 0,
                        end,
                        visits: vec![knot.uuid],
                        gather_start: None,
                    },
                }
            }
            Address::Stitch(_, index) => {
                let stitch = knot
                    .stitches
                    .get(index)
                    .ok_or_else(|| NavigationError::UnknownTarget(knot.name.clone()))?;
                Location {
                    knot: knot_id,
                    start: stitch.offset,
                    end: knot.segment_end(stitch.offset),
                    visits: vec![stitch.uuid],
                    gather_start: None,
                }
            }
            Address::Gather(_, uuid) => {
                let gather = knot
                    .all_gathers()
                    .find(|g| g.uuid == uuid)
                    .ok_or_else(|| NavigationError::UnknownTarget(uuid.to_string()))?;
                let start = gather.start();
                Location {
                    knot: knot_id,
                    start,
                    end: knot.segment_end(start),
                    visits: vec![gather.uuid],
                    gather_start: Some(start),
                }
            }
        };
        Ok(location)
    }
}

fn validate(knot: &Knot) -> Result<(), StructureError> {
    let len = knot.objects.len();
    let mut previous = 0;
    for stitch in &knot.stitches {
        if stitch.offset > len || stitch.offset < previous {
            return Err(StructureError::InvalidStitchOffset {
                knot: knot.name.clone(),
                stitch: stitch.name.clone(),
            });
        }
        previous = stitch.offset;
    }
    for gather in knot.all_gathers() {
        let follows_choice = matches!(
            knot.objects.get(gather.choice_index),
            Some(crate::content::ContentObject::Choice(_))
        );
        if !follows_choice {
            return Err(StructureError::InvalidGather {
                knot: knot.name.clone(),
                gather: gather.name.clone(),
            });
        }
    }
    Ok(())
}

impl TryFrom<Vec<Knot>> for StoryContent {
    type Error = StructureError;

    fn try_from(knots: Vec<Knot>) -> Result<Self, StructureError> {
        Self::new(knots)
    }
}

impl From<StoryContent> for Vec<Knot> {
    fn from(content: StoryContent) -> Self {
        content.knots
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::content::{Choice, ContentObject};
    use crate::error::StoryError;

    fn knot(name: &str, uuid: u32, objects: Vec<ContentObject>) -> Knot {
        Knot {
            name: name.to_string(),
            uuid: Uuid(uuid),
            parameters: Vec::new(),
            objects: Rc::new(objects),
            stitches: Vec::new(),
            gather_points: Vec::new(),
            is_function: false,
        }
    }

    fn text(s: &str) -> ContentObject {
        ContentObject::Text(s.to_string())
    }

    fn sample() -> StoryContent {
        let mut hall = knot(
            "hall",
            1,
            vec![
                ContentObject::Choice(Choice {
                    id: Uuid(9),
                    entries: Vec::new(),
                }),
                text("rejoined"),
                text("upstairs"),
                text("cellar"),
            ],
        );
        hall.gather_points.push(GatherPoint {
            name: "meet".into(),
            uuid: Uuid(2),
            nesting_level: 1,
            choice_index: 0,
        });
        hall.stitches = vec![
            Stitch {
                name: "upstairs".into(),
                uuid: Uuid(3),
                offset: 2,
                gather_points: Vec::new(),
            },
            Stitch {
                name: "cellar".into(),
                uuid: Uuid(4),
                offset: 3,
                gather_points: Vec::new(),
            },
        ];
        let mut empty = knot("tower", 5, vec![text("top")]);
        empty.stitches.push(Stitch {
            name: "top".into(),
            uuid: Uuid(6),
            offset: 0,
            gather_points: Vec::new(),
        });
        StoryContent::new(vec![hall, empty]).unwrap()
    }

    #[test]
    fn resolves_paths() {
        let story = sample();
        let hall = story.knot_id("hall").unwrap();
        assert_eq!(story.resolve("hall", None).unwrap(), Address::Knot(hall));
        assert_eq!(
            story.resolve("hall.cellar", None).unwrap(),
            Address::Stitch(hall, 1)
        );
        assert_eq!(
            story.resolve("meet", Some(hall)).unwrap(),
            Address::Gather(hall, Uuid(2))
        );
        assert!(matches!(
            story.resolve("meet", None),
            Err(StoryError::Navigation(NavigationError::UnknownTarget(_)))
        ));
        assert!(matches!(
            story.resolve("a.b.c.d", None),
            Err(StoryError::Structure(StructureError::PathTooDeep(_)))
        ));
    }

    #[test]
    fn segments_end_at_next_stitch() {
        let story = sample();
        let hall = story.knot_id("hall").unwrap();
        let body = story.locate(Address::Knot(hall)).unwrap();
        assert_eq!((body.start, body.end), (0, 2));
        let upstairs = story.locate(Address::Stitch(hall, 0)).unwrap();
        assert_eq!((upstairs.start, upstairs.end), (2, 3));
        let meet = story.locate(Address::Gather(hall, Uuid(2))).unwrap();
        assert_eq!((meet.start, meet.end), (1, 2));
        assert_eq!(meet.gather_start, Some(1));
    }

    #[test]
    fn empty_knot_body_enters_first_stitch() {
        let story = sample();
        let tower = story.knot_id("tower").unwrap();
        let location = story.locate(Address::Knot(tower)).unwrap();
        assert_eq!((location.start, location.end), (0, 1));
        assert_eq!(location.visits, vec![Uuid(5), Uuid(6)]);
    }

    #[test]
    fn rejects_duplicate_knots() {
        let result = StoryContent::new(vec![knot("a", 0, vec![]), knot("a", 1, vec![])]);
        assert_eq!(result, Err(StructureError::DuplicateKnot("a".into())));
    }

    #[test]
    fn rejects_gather_without_choice() {
        let mut bad = knot("a", 0, vec![text("x"), text("y")]);
        bad.gather_points.push(GatherPoint {
            name: "g".into(),
            uuid: Uuid(1),
            nesting_level: 1,
            choice_index: 0,
        });
        assert!(matches!(
            StoryContent::new(vec![bad]),
            Err(StructureError::InvalidGather { .. })
        ));
    }

    #[test]
    fn json_round_trip_rebuilds_index() {
        let story = sample();
        let json = story.to_json().unwrap();
        let back = StoryContent::from_json(&json).unwrap();
        assert_eq!(back, story);
        assert_eq!(back.knot_id("tower"), Some(KnotId(1)));
    }
}

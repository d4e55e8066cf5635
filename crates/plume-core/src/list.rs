use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Identifier of a registered list definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId(pub u32);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list#{}", self.0)
    }
}

/// One member of a list: a label drawn from a definition, with the numeric
/// value that definition assigns to it.
///
/// Items order by value, then origin, then label. Equality and hashing
/// compare all three fields; since an item's value always matches its
/// definition (see [`ListDefinitions::check`]), identity is effectively
/// `(origin, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListItem {
    /// The item name within its definition.
    pub label: String,
    /// The value the definition assigns to the label.
    pub value: i64,
    /// The definition the item belongs to.
    pub origin: DefinitionId,
}

impl ListItem {
    /// Create an item. Prefer [`ListDefinition::item`], which guarantees the
    /// value matches the definition.
    pub fn new(label: impl Into<String>, value: i64, origin: DefinitionId) -> Self {
        Self {
            label: label.into(),
            value,
            origin,
        }
    }
}

impl PartialOrd for ListItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ListItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then(self.origin.cmp(&other.origin))
            .then_with(|| self.label.cmp(&other.label))
    }
}

/// A named, closed universe of list items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDefinition {
    id: DefinitionId,
    name: String,
    entries: Vec<(String, i64)>,
}

impl ListDefinition {
    /// Create a definition from `(label, value)` pairs.
    pub fn new<S: Into<String>>(
        id: DefinitionId,
        name: impl Into<String>,
        entries: impl IntoIterator<Item = (S, i64)>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            entries: entries.into_iter().map(|(l, v)| (l.into(), v)).collect(),
        }
    }

    /// The definition's id.
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    /// The definition's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw `(label, value)` entries in declaration order.
    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    /// Look up an item by label.
    pub fn item(&self, label: &str) -> Option<ListItem> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(l, v)| ListItem::new(l.clone(), *v, self.id))
    }

    /// Look up an item by its value.
    pub fn item_with_value(&self, value: i64) -> Option<ListItem> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(l, v)| ListItem::new(l.clone(), *v, self.id))
    }

    /// Iterate over every item of the definition.
    pub fn items(&self) -> impl Iterator<Item = ListItem> + '_ {
        self.entries
            .iter()
            .map(|(l, v)| ListItem::new(l.clone(), *v, self.id))
    }
}

/// Registry of every list definition known to a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListDefinitions {
    definitions: BTreeMap<DefinitionId, ListDefinition>,
    by_name: HashMap<String, DefinitionId>,
}

impl ListDefinitions {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new definition and return its id.
    pub fn define<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        entries: impl IntoIterator<Item = (S, i64)>,
    ) -> ValueResult<DefinitionId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ValueError::DuplicateList(name));
        }
        let id = DefinitionId(self.definitions.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.definitions
            .insert(id, ListDefinition::new(id, name, entries));
        Ok(id)
    }

    /// Get a definition by id.
    pub fn get(&self, id: DefinitionId) -> Option<&ListDefinition> {
        self.definitions.get(&id)
    }

    /// Get a definition by id, failing if it was never registered.
    pub fn require(&self, id: DefinitionId) -> ValueResult<&ListDefinition> {
        self.get(id).ok_or(ValueError::UnknownDefinition(id))
    }

    /// Get a definition by name.
    pub fn by_name(&self, name: &str) -> Option<&ListDefinition> {
        self.by_name.get(name).and_then(|id| self.definitions.get(id))
    }

    /// Whether a definition with this name exists.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Resolve `List.label` or a bare `label` to an item.
    ///
    /// A bare label resolves to the first definition (in registration order)
    /// that declares it.
    pub fn find_item(&self, reference: &str) -> Option<ListItem> {
        match reference.split_once('.') {
            Some((list, label)) => self.by_name(list).and_then(|d| d.item(label)),
            None => self.definitions.values().find_map(|d| d.item(reference)),
        }
    }

    /// Check that every item of `list` exists in its definition with the
    /// value the definition registers.
    pub fn check(&self, list: &List) -> ValueResult<()> {
        for item in list.items() {
            let def = self.require(item.origin)?;
            let registered = def.item(&item.label).ok_or_else(|| ValueError::UnknownItem {
                list: def.name().to_string(),
                label: item.label.clone(),
            })?;
            if registered.value != item.value {
                return Err(ValueError::ItemValueMismatch {
                    origin: item.origin,
                    label: item.label.clone(),
                    expected: registered.value,
                    found: item.value,
                });
            }
        }
        Ok(())
    }

    /// Build a single-item list from a definition name and an item value.
    pub fn item_by_value(&self, name: &str, value: i64) -> ValueResult<List> {
        let def = self
            .by_name(name)
            .ok_or_else(|| ValueError::UnknownList(name.to_string()))?;
        Ok(match def.item_with_value(value) {
            Some(item) => List::from_item(item),
            None => List::new().with_origin(def.id()),
        })
    }

    /// Iterate over every definition in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ListDefinition> {
        self.definitions.values()
    }
}

/// A set of list items plus the definitions ("origins") it may draw from.
///
/// Lists are values: every operation returns a new list. The origin set is
/// what makes [`List::inverse`] and [`List::all_possible_items`] well defined
/// for lists that are currently empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct List {
    items: BTreeSet<ListItem>,
    origins: BTreeSet<DefinitionId>,
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl List {
    /// The empty list with no origins.
    pub fn new() -> Self {
        Self::default()
    }

    /// A list holding exactly one item.
    pub fn from_item(item: ListItem) -> Self {
        let mut origins = BTreeSet::new();
        origins.insert(item.origin);
        let mut items = BTreeSet::new();
        items.insert(item);
        Self { items, origins }
    }

    /// A list holding the given items; origins are taken from the items.
    pub fn from_items(items: impl IntoIterator<Item = ListItem>) -> Self {
        let items: BTreeSet<ListItem> = items.into_iter().collect();
        let origins = items.iter().map(|i| i.origin).collect();
        Self { items, origins }
    }

    /// Add an origin without adding items.
    pub fn with_origin(mut self, origin: DefinitionId) -> Self {
        self.origins.insert(origin);
        self
    }

    /// Items in ascending value order.
    pub fn items(&self) -> impl DoubleEndedIterator<Item = &ListItem> {
        self.items.iter()
    }

    /// The definitions this list may draw from.
    pub fn origins(&self) -> impl Iterator<Item = DefinitionId> + '_ {
        self.origins.iter().copied()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the list holds `item`.
    pub fn contains_item(&self, item: &ListItem) -> bool {
        self.items.contains(item)
    }

    /// Item with the smallest value.
    pub fn min_item(&self) -> Option<&ListItem> {
        self.items.iter().next()
    }

    /// Item with the largest value.
    pub fn max_item(&self) -> Option<&ListItem> {
        self.items.iter().next_back()
    }

    /// Numeric value of the list: the largest item value, or 0 when empty.
    pub fn value(&self) -> i64 {
        self.max_item().map(|i| i.value).unwrap_or(0)
    }

    /// Set union; origins are merged.
    pub fn union(&self, other: &List) -> List {
        List {
            items: self.items.union(&other.items).cloned().collect(),
            origins: self.origins.union(&other.origins).copied().collect(),
        }
    }

    /// Set difference; keeps this list's origins.
    pub fn difference(&self, other: &List) -> List {
        List {
            items: self.items.difference(&other.items).cloned().collect(),
            origins: self.origins.clone(),
        }
    }

    /// Set intersection; origins are merged.
    pub fn intersect(&self, other: &List) -> List {
        List {
            items: self.items.intersection(&other.items).cloned().collect(),
            origins: self.origins.union(&other.origins).copied().collect(),
        }
    }

    /// Whether every item of `other` is present in this list.
    ///
    /// Vacuously true when `other` is empty.
    pub fn contains(&self, other: &List) -> bool {
        other.items.iter().all(|i| self.items.contains(i))
    }

    /// Every item of every origin definition.
    pub fn all_possible_items(&self, definitions: &ListDefinitions) -> ValueResult<List> {
        let mut items = BTreeSet::new();
        for origin in &self.origins {
            items.extend(definitions.require(*origin)?.items());
        }
        Ok(List {
            items,
            origins: self.origins.clone(),
        })
    }

    /// Every item of the origin definitions that is not in this list.
    pub fn inverse(&self, definitions: &ListDefinitions) -> ValueResult<List> {
        let all = self.all_possible_items(definitions)?;
        Ok(all.difference(self))
    }

    /// Move every item `by` steps in value within its own definition,
    /// dropping items that have no such neighbour.
    pub fn shift(&self, by: i64, definitions: &ListDefinitions) -> ValueResult<List> {
        let mut items = BTreeSet::new();
        for item in &self.items {
            let def = definitions.require(item.origin)?;
            if let Some(moved) = def.item_with_value(item.value.saturating_add(by)) {
                items.insert(moved);
            }
        }
        Ok(List {
            items,
            origins: self.origins.clone(),
        })
    }

    /// Single-item list holding the minimum item (empty if this is empty).
    pub fn min_list(&self) -> List {
        self.single(self.min_item())
    }

    /// Single-item list holding the maximum item (empty if this is empty).
    pub fn max_list(&self) -> List {
        self.single(self.max_item())
    }

    fn single(&self, item: Option<&ListItem>) -> List {
        let mut items = BTreeSet::new();
        if let Some(item) = item {
            items.insert(item.clone());
        }
        List {
            items,
            origins: self.origins.clone(),
        }
    }

    /// Items whose value lies in `min..=max`.
    pub fn range(&self, min: i64, max: i64) -> List {
        List {
            items: self
                .items
                .iter()
                .filter(|i| i.value >= min && i.value <= max)
                .cloned()
                .collect(),
            origins: self.origins.clone(),
        }
    }

    /// `a < b`: every item of `a` is below every item of `b`.
    pub fn less_than(&self, other: &List) -> bool {
        match (self.max_item(), other.min_item()) {
            (Some(max), Some(min)) => max.value < min.value,
            _ => false,
        }
    }

    /// `a > b`: every item of `a` is above every item of `b`.
    pub fn greater_than(&self, other: &List) -> bool {
        match (self.min_item(), other.max_item()) {
            (Some(min), Some(max)) => min.value > max.value,
            _ => false,
        }
    }

    /// `a <= b`: neither bound of `a` exceeds the matching bound of `b`.
    pub fn less_or_equal(&self, other: &List) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((a_min, a_max)), Some((b_min, b_max))) => a_max <= b_max && a_min <= b_min,
            _ => false,
        }
    }

    /// `a >= b`: neither bound of `a` is below the matching bound of `b`.
    pub fn greater_or_equal(&self, other: &List) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((a_min, a_max)), Some((b_min, b_max))) => a_min >= b_min && a_max >= b_max,
            _ => false,
        }
    }

    fn bounds(&self) -> Option<(i64, i64)> {
        Some((self.min_item()?.value, self.max_item()?.value))
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.items.iter().map(|i| i.label.as_str()).collect();
        write!(f, "{}", labels.join(", "))
    }
}

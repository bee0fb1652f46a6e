// ABOUTME: Name resolution table mapping logical service names to remote sandbox requests
// ABOUTME: Holds the grouped-name set and the response-key and resource-type remap tables

use std::collections::{BTreeSet, HashMap};

/// Resource type requested once for every grouped name.
pub const GROUPED_RESOURCE_TYPE: &str = "local_dev";

/// Logical names served together by a single `local_dev` sandbox.
const DEFAULT_GROUPED_NAMES: &[&str] = &["filesystem", "terminal", "git", "python"];

/// Grouped logical name -> key under which the shared sandbox reports its endpoint.
const DEFAULT_RESPONSE_KEYS: &[(&str, &str)] = &[("python", "python_execute")];

/// Ungrouped logical name -> resource type to request.
const DEFAULT_RESOURCE_TYPES: &[(&str, &str)] = &[("emails", "poste_email_toolathlon")];

/// Requested names split by how they are acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub grouped: Vec<String>,
    pub ungrouped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NameTable {
    grouped: BTreeSet<String>,
    response_keys: HashMap<String, String>,
    resource_types: HashMap<String, String>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self {
            grouped: DEFAULT_GROUPED_NAMES.iter().map(|s| s.to_string()).collect(),
            response_keys: to_map(DEFAULT_RESPONSE_KEYS),
            resource_types: to_map(DEFAULT_RESOURCE_TYPES),
        }
    }
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl NameTable {
    /// An empty table: nothing grouped, no renames.
    pub fn empty() -> Self {
        Self {
            grouped: BTreeSet::new(),
            response_keys: HashMap::new(),
            resource_types: HashMap::new(),
        }
    }

    pub fn with_grouped(mut self, name: impl Into<String>) -> Self {
        self.grouped.insert(name.into());
        self
    }

    pub fn with_response_key(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.response_keys.insert(name.into(), key.into());
        self
    }

    pub fn with_resource_type(
        mut self,
        name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        self.resource_types.insert(name.into(), resource_type.into());
        self
    }

    pub fn is_grouped(&self, name: &str) -> bool {
        self.grouped.contains(name)
    }

    /// Key the grouped sandbox uses for `name`; the name itself when not remapped.
    pub fn response_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.response_keys
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Resource type to request for `name`; the name itself when not remapped.
    pub fn resource_type<'a>(&'a self, name: &'a str) -> &'a str {
        self.resource_types
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Split names into grouped and ungrouped, dropping duplicates and
    /// keeping first-seen order within each side.
    pub fn partition<I, S>(&self, names: I) -> Partition
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut partition = Partition::default();

        for name in names {
            let name = name.as_ref();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            if self.is_grouped(name) {
                partition.grouped.push(name.to_string());
            } else {
                partition.ungrouped.push(name.to_string());
            }
        }

        partition
    }
}

/// `finalpool/notion-personal-website` -> `Toolathlon_notion_personal_website`
pub fn task_dir_to_task_name(task_dir: &str) -> String {
    let leaf = task_dir
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    format!("Toolathlon_{}", leaf.replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_splits_grouped_names() {
        let table = NameTable::default();
        let partition = table.partition(["filesystem", "emails", "terminal", "notion"]);

        assert_eq!(partition.grouped, vec!["filesystem", "terminal"]);
        assert_eq!(partition.ungrouped, vec!["emails", "notion"]);
    }

    #[test]
    fn test_partition_drops_duplicates_and_blanks() {
        let table = NameTable::default();
        let partition = table.partition(["notion", "", "notion", "git", "git"]);

        assert_eq!(partition.grouped, vec!["git"]);
        assert_eq!(partition.ungrouped, vec!["notion"]);
    }

    #[test]
    fn test_single_grouped_member_is_still_grouped() {
        let partition = NameTable::default().partition(["terminal"]);
        assert_eq!(partition.grouped, vec!["terminal"]);
        assert!(partition.ungrouped.is_empty());
    }

    #[test]
    fn test_response_key_lookup_defaults_to_name() {
        let table = NameTable::default();
        assert_eq!(table.response_key("python"), "python_execute");
        assert_eq!(table.response_key("filesystem"), "filesystem");
    }

    #[test]
    fn test_resource_type_lookup_defaults_to_name() {
        let table = NameTable::default();
        assert_eq!(table.resource_type("emails"), "poste_email_toolathlon");
        assert_eq!(table.resource_type("notion"), "notion");
    }

    #[test]
    fn test_tables_are_independent() {
        // A response-key rename must not leak into resource-type lookups.
        let table = NameTable::empty()
            .with_response_key("calendar", "gcal")
            .with_resource_type("mail", "imap_server");

        assert_eq!(table.resource_type("calendar"), "calendar");
        assert_eq!(table.response_key("mail"), "mail");
        assert_eq!(table.response_key("calendar"), "gcal");
        assert_eq!(table.resource_type("mail"), "imap_server");
    }

    #[test]
    fn test_empty_table_groups_nothing() {
        let partition = NameTable::empty().partition(["filesystem", "terminal"]);
        assert!(partition.grouped.is_empty());
        assert_eq!(partition.ungrouped.len(), 2);
    }

    #[test]
    fn test_task_dir_to_task_name() {
        assert_eq!(
            task_dir_to_task_name("finalpool/notion-personal-website"),
            "Toolathlon_notion_personal_website"
        );
        assert_eq!(task_dir_to_task_name("arrange-workspace/"), "Toolathlon_arrange_workspace");
    }
}

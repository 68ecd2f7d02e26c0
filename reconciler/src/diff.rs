use crate::types::EntrySet;
use std::collections::BTreeSet;

/// Keys published previously that the current desired state no longer contains.
pub fn stale_keys<'a, I>(prior: I, desired: &EntrySet) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    prior
        .into_iter()
        .filter(|key| !desired.contains_key(*key))
        .cloned()
        .collect()
}

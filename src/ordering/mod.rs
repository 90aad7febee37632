use crate::catalog::{Catalog, ScriptFile};
use crate::core::ScriptKind;

/// Resolve the deterministic execution order for a catalog.
///
/// Versioned scripts first in strictly increasing version order, then
/// repeatable scripts by description, then always scripts by
/// description. The order is purely a function of the catalog: ledger
/// contents never change what order a run would execute in, so two
/// operators reasoning about a script root reach the same answer
/// without querying anything.
pub fn resolve_order(catalog: &Catalog) -> Vec<ScriptFile> {
    let mut versioned = Vec::new();
    let mut repeatable = Vec::new();
    let mut always = Vec::new();

    for script in catalog.iter() {
        match script.kind {
            ScriptKind::Versioned => versioned.push(script.clone()),
            ScriptKind::Repeatable => repeatable.push(script.clone()),
            ScriptKind::Always => always.push(script.clone()),
        }
    }

    versioned.sort_by(|a, b| a.version.cmp(&b.version));
    repeatable.sort_by(|a, b| a.description.cmp(&b.description));
    always.sort_by(|a, b| a.description.cmp(&b.description));

    let mut ordered = versioned;
    ordered.append(&mut repeatable);
    ordered.append(&mut always);
    ordered
}

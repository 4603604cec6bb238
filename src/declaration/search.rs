use super::Declaration;

/// Whether `declaration` matches the search `term`.
///
/// Case-insensitive substring over the child's names and the parents'
/// surnames. A blank term matches everything.
pub fn matches(declaration: &Declaration, term: &str) -> bool {
    if term.trim().is_empty() {
        return true;
    }
    let term = term.to_lowercase();

    [
        &declaration.child.surname,
        &declaration.child.given_name,
        &declaration.father.surname,
        &declaration.mother.surname,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// Declarations matching `term`, in their original order.
pub fn search<'a>(declarations: &'a [Declaration], term: &str) -> Vec<&'a Declaration> {
    declarations.iter().filter(|d| matches(d, term)).collect()
}

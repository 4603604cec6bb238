//! Declaration form rules.
//!
//! Which fields are mandatory depends on the parents' marital status, so
//! rules are listed in a table instead of derived attributes.

use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors};

use super::Declaration;

const ID_DOCUMENT_MIN: usize = 9;
const ID_DOCUMENT_MAX: usize = 12;

enum Rule {
    /// Must not be blank.
    Required(&'static str),
    /// Identity document number: blank, or 9 to 12 letters and digits.
    IdDocument,
}

#[derive(PartialEq)]
enum When {
    Always,
    Married,
    Unmarried,
}

struct Check {
    field: &'static str,
    value: fn(&Declaration) -> &str,
    rule: Rule,
    when: When,
}

const CHECKS: &[Check] = &[
    Check {
        field: "nom",
        value: |d| &d.child.surname,
        rule: Rule::Required("Le nom de l'enfant est obligatoire."),
        when: When::Always,
    },
    Check {
        field: "prenom",
        value: |d| &d.child.given_name,
        rule: Rule::Required("Le prénom de l'enfant est obligatoire."),
        when: When::Always,
    },
    Check {
        field: "dateNaissance",
        value: |d| &d.child.birth_date,
        rule: Rule::Required("La date de naissance est obligatoire."),
        when: When::Always,
    },
    Check {
        field: "nomPere",
        value: |d| &d.father.surname,
        rule: Rule::Required("Le nom du père est obligatoire."),
        when: When::Married,
    },
    Check {
        field: "prenomPere",
        value: |d| &d.father.given_name,
        rule: Rule::Required("Le prénom du père est obligatoire."),
        when: When::Married,
    },
    Check {
        field: "dateMariageParents",
        value: |d| &d.marriage.date,
        rule: Rule::Required("La date de mariage est obligatoire."),
        when: When::Married,
    },
    Check {
        field: "lieuMariageParents",
        value: |d| &d.marriage.place,
        rule: Rule::Required("Le lieu de mariage est obligatoire."),
        when: When::Married,
    },
    Check {
        field: "nomMere",
        value: |d| &d.mother.surname,
        rule: Rule::Required("Le nom de la mère est obligatoire."),
        when: When::Unmarried,
    },
    Check {
        field: "prenomMere",
        value: |d| &d.mother.given_name,
        rule: Rule::Required("Le prénom de la mère est obligatoire."),
        when: When::Unmarried,
    },
    Check {
        field: "pieceIdPere",
        value: |d| &d.father.id_document,
        rule: Rule::IdDocument,
        when: When::Always,
    },
    Check {
        field: "pieceIdMere",
        value: |d| &d.mother.id_document,
        rule: Rule::IdDocument,
        when: When::Always,
    },
    Check {
        field: "pieceIdDeclarant",
        value: |d| &d.declarant.id_document,
        rule: Rule::IdDocument,
        when: When::Always,
    },
];

/// Whether `value` looks like an identity document number.
pub fn is_id_document(value: &str) -> bool {
    let len = value.chars().count();
    (ID_DOCUMENT_MIN..=ID_DOCUMENT_MAX).contains(&len)
        && value.chars().all(|c| c.is_ascii_alphanumeric())
}

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

impl Validate for Declaration {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for check in CHECKS {
            let applies = match check.when {
                When::Always => true,
                When::Married => self.marriage.married,
                When::Unmarried => !self.marriage.married,
            };
            if !applies {
                continue;
            }

            let value = (check.value)(self).trim();
            match check.rule {
                Rule::Required(message) if value.is_empty() => {
                    errors.add(check.field, failure("required", message));
                },
                Rule::IdDocument if !value.is_empty() && !is_id_document(value) => {
                    errors.add(
                        check.field,
                        failure(
                            "id_document",
                            "Le numéro de pièce d'identité doit contenir 9 à 12 caractères alphanumériques.",
                        ),
                    );
                },
                _ => {},
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

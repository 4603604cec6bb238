//! Birth declarations.
//!
//! Stored documents use flat camelCase keys (`nom`, `prenomPere`, …);
//! the Rust side groups them per tab of the declaration form.
mod form;
mod repository;
mod search;

pub use form::*;
pub use repository::*;
pub use search::*;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const MARRIED_LABEL: &str = "Marié";
pub const NOT_MARRIED_LABEL: &str = "Non marié";

/// Sex of the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

/// Whether a parent is alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeStatus {
    #[default]
    #[serde(rename = "Vivant")]
    Alive,
    #[serde(rename = "Décédé")]
    Deceased,
}

impl LifeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LifeStatus::Alive => "Vivant",
            LifeStatus::Deceased => "Décédé",
        }
    }
}

/// Decode a value, falling back to the default when it is unknown.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Older documents store booleans as `1`/`0`. Only `true` and `1` are set.
fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

fn bool_as_int<S>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u8(u8::from(*flag))
}

/// "Enfant" tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Child {
    #[serde(rename = "nom")]
    pub surname: String,
    #[serde(rename = "prenom")]
    pub given_name: String,
    #[serde(rename = "dateNaissance")]
    pub birth_date: String,
    #[serde(rename = "heureNaissance")]
    pub birth_time: String,
    #[serde(rename = "lieuNaissance")]
    pub birth_place: String,
    #[serde(rename = "sexe", deserialize_with = "lenient")]
    pub sex: Option<Sex>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Father {
    #[serde(rename = "nomPere")]
    pub surname: String,
    #[serde(rename = "prenomPere")]
    pub given_name: String,
    #[serde(rename = "dateNaissancePere")]
    pub birth_date: String,
    #[serde(rename = "lieuNaissancePere")]
    pub birth_place: String,
    #[serde(rename = "professionPere")]
    pub profession: String,
    #[serde(rename = "nationalitePere")]
    pub nationality: String,
    #[serde(rename = "adressePere")]
    pub address: String,
    #[serde(rename = "pieceIdPere")]
    pub id_document: String,
    #[serde(rename = "statutPere", deserialize_with = "lenient")]
    pub status: LifeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mother {
    #[serde(rename = "nomMere")]
    pub surname: String,
    #[serde(rename = "prenomMere")]
    pub given_name: String,
    #[serde(rename = "nomJeuneFilleMere")]
    pub maiden_name: String,
    #[serde(rename = "dateNaissanceMere")]
    pub birth_date: String,
    #[serde(rename = "lieuNaissanceMere")]
    pub birth_place: String,
    #[serde(rename = "professionMere")]
    pub profession: String,
    #[serde(rename = "nationaliteMere")]
    pub nationality: String,
    #[serde(rename = "adresseMere")]
    pub address: String,
    #[serde(rename = "pieceIdMere")]
    pub id_document: String,
    #[serde(rename = "statutMere", deserialize_with = "lenient")]
    pub status: LifeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Marriage {
    #[serde(
        rename = "parentsMaries",
        deserialize_with = "bool_or_int",
        serialize_with = "bool_as_int"
    )]
    pub married: bool,
    #[serde(rename = "statutMarital")]
    pub marital_status: String,
    #[serde(rename = "dateMariageParents")]
    pub date: String,
    #[serde(rename = "lieuMariageParents")]
    pub place: String,
}

/// "Déclarant" tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Declarant {
    #[serde(rename = "nomDeclarant")]
    pub surname: String,
    #[serde(rename = "prenomDeclarant")]
    pub given_name: String,
    #[serde(rename = "adresseDeclarant")]
    pub address: String,
    #[serde(rename = "lienDeclarant")]
    pub relationship: String,
    #[serde(rename = "pieceIdDeclarant")]
    pub id_document: String,
}

/// "Documents" tab: free-text references to supporting documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Documents {
    #[serde(rename = "certificatAccouchement")]
    pub delivery_certificate: String,
    #[serde(rename = "livretFamille")]
    pub family_record_book: String,
    #[serde(rename = "acteNaissPere")]
    pub father_birth_certificate: String,
    #[serde(rename = "acteNaissMere")]
    pub mother_birth_certificate: String,
    #[serde(rename = "acteReconnaissance")]
    pub acknowledgement_deed: String,
    #[serde(rename = "certificatNationalite")]
    pub nationality_certificate: String,
}

/// Birth declaration as saved on the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Key assigned by the database. Never part of the stored fields.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(flatten)]
    pub child: Child,
    #[serde(flatten)]
    pub father: Father,
    #[serde(flatten)]
    pub mother: Mother,
    #[serde(flatten)]
    pub marriage: Marriage,
    #[serde(flatten)]
    pub declarant: Declarant,
    #[serde(flatten)]
    pub documents: Documents,
    /// RFC 3339 timestamp of the last submission.
    #[serde(
        rename = "dateDeclaration",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub declared_at: Option<String>,
}

impl Declaration {
    /// Prepare a validated form for writing.
    ///
    /// Unmarried parents carry no marriage date or place.
    pub fn normalize(mut self) -> Self {
        if self.marriage.married {
            self.marriage.marital_status = MARRIED_LABEL.to_owned();
        } else {
            self.marriage.marital_status = NOT_MARRIED_LABEL.to_owned();
            self.marriage.date.clear();
            self.marriage.place.clear();
        }

        self.declared_at =
            Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        self
    }

    /// Same declaration with every date cut to `YYYY-MM-DD`, as the edit
    /// form expects.
    pub fn for_edit(mut self) -> Self {
        for date in [
            &mut self.child.birth_date,
            &mut self.father.birth_date,
            &mut self.mother.birth_date,
            &mut self.marriage.date,
        ] {
            if let Some(index) = date.find('T') {
                date.truncate(index);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_flat_document() {
        let declaration: Declaration = serde_json::from_value(json!({
            "nom": "Rakoto",
            "prenom": "Hery",
            "dateNaissance": "2024-03-15",
            "sexe": "M",
            "nomMere": "Martin",
            "statutMere": "Décédé",
            "parentsMaries": 1,
            "dateDeclaration": "2024-03-16T08:00:00.000Z",
        }))
        .unwrap();

        assert_eq!(declaration.child.surname, "Rakoto");
        assert_eq!(declaration.child.sex, Some(Sex::Male));
        assert_eq!(declaration.mother.surname, "Martin");
        assert_eq!(declaration.mother.status, LifeStatus::Deceased);
        assert_eq!(declaration.father.status, LifeStatus::Alive);
        assert!(declaration.marriage.married);
        assert_eq!(
            declaration.declared_at.as_deref(),
            Some("2024-03-16T08:00:00.000Z")
        );
    }

    #[test]
    fn test_lenient_fields() {
        let declaration: Declaration = serde_json::from_value(json!({
            "nom": "Rabe",
            "sexe": "",
            "statutPere": "inconnu",
            "parentsMaries": false,
        }))
        .unwrap();

        assert_eq!(declaration.child.sex, None);
        assert_eq!(declaration.father.status, LifeStatus::Alive);
        assert!(!declaration.marriage.married);
    }

    #[test]
    fn test_married_only_for_true_or_one() {
        let married = |flag: Value| -> bool {
            serde_json::from_value::<Declaration>(json!({ "parentsMaries": flag }))
                .unwrap()
                .marriage
                .married
        };

        assert!(married(json!(true)));
        assert!(married(json!(1)));
        assert!(!married(json!(2)));
        assert!(!married(json!(-1)));
        assert!(!married(json!("1")));
        assert!(!married(json!("true")));
        assert!(!married(json!(0)));
    }

    #[test]
    fn test_writes_married_flag_as_integer() {
        let mut declaration = Declaration::default();
        declaration.marriage.married = true;

        let value = serde_json::to_value(&declaration).unwrap();
        assert_eq!(value["parentsMaries"], 1);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_normalize_clears_marriage_when_unmarried() {
        let mut declaration = Declaration::default();
        declaration.marriage.date = "2020-01-01".into();
        declaration.marriage.place = "Antsirabe".into();

        let declaration = declaration.normalize();
        assert_eq!(declaration.marriage.marital_status, NOT_MARRIED_LABEL);
        assert!(declaration.marriage.date.is_empty());
        assert!(declaration.marriage.place.is_empty());
        assert!(declaration.declared_at.is_some());
    }

    #[test]
    fn test_for_edit_truncates_dates() {
        let mut declaration = Declaration::default();
        declaration.child.birth_date = "2024-03-15T00:00:00.000Z".into();
        declaration.marriage.date = "2019-07-01".into();

        let declaration = declaration.for_edit();
        assert_eq!(declaration.child.birth_date, "2024-03-15");
        assert_eq!(declaration.marriage.date, "2019-07-01");
    }
}

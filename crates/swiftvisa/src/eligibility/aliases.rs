use super::domain::{CategoryCode, FixedField};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const FIXED_KEYS: &[(&str, FixedField)] = &[
    ("age", FixedField::Age),
    ("nationality", FixedField::Nationality),
    ("education", FixedField::Education),
    ("employment", FixedField::Employment),
    ("income", FixedField::Income),
    ("visaType", FixedField::VisaType),
    ("visa_type", FixedField::VisaType),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("F1 Student", "f1"),
    ("H1B Work", "h1b"),
    ("B1/B2 Visitor", "b1b2"),
    ("K1 Fiance", "k1"),
];

const FIELDS: &[(&str, &[&str])] = &[
    // F1
    ("university_acceptance", &["universityAcceptance"]),
    ("school_name", &["schoolName"]),
    ("i20_issued", &["formI20Issued"]),
    ("proof_of_funds_amount", &["proofOfFundsAmount", "proofOfFunds"]),
    ("test_scores", &["testScores"]),
    // H1B
    ("job_offer", &["jobOffer"]),
    ("employer_name", &["employerName"]),
    ("years_experience", &[]),
    ("degree_equiv", &[]),
    ("specialty_occupation", &["specialtyOccupation"]),
    ("lca_filed", &["lca"]),
    // B1/B2
    ("travel_purpose", &["travelPurpose"]),
    ("trip_duration_days", &[]),
    ("invitation_host", &[]),
    ("return_ticket", &[]),
    ("return_ties", &["returnTies"]),
    ("previous_visits", &["previousVisits"]),
    // K1
    ("us_citizen_sponsor", &["uscitizenFiance", "usCitizenSponsor"]),
    ("met_in_person", &["metInPerson"]),
    ("relationship_length_months", &[]),
    ("evidence_list", &[]),
    ("intent_to_marry", &["intentToMarry"]),
];

#[derive(Debug, thiserror::Error)]
pub enum AliasTableError {
    #[error("alias '{alias}' resolves to both '{existing}' and '{requested}'")]
    ConflictingAlias {
        alias: String,
        existing: String,
        requested: String,
    },
    #[error("field name '{name}' is reserved for a top-level attribute")]
    ShadowsFixedKey { name: String },
    #[error("visa type '{label}' maps to an empty category code")]
    EmptyCategoryCode { label: String },
    #[error("failed to read alias table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid alias table document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Declarative normalization rules: field aliases, fixed top-level keys, and
/// the visa type to category mapping.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    canonical_of: HashMap<String, String>,
    fixed_keys: HashMap<String, FixedField>,
    category_of: HashMap<String, CategoryCode>,
}

/// On-disk shape of a deployment-specific table.
#[derive(Debug, Deserialize)]
struct AliasTableDocument {
    #[serde(default)]
    fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    categories: BTreeMap<String, String>,
}

impl AliasTable {
    /// Empty table carrying only the fixed top-level keys.
    pub fn empty() -> Self {
        let fixed_keys = FIXED_KEYS
            .iter()
            .map(|(key, field)| (key.to_string(), *field))
            .collect();

        Self {
            canonical_of: HashMap::new(),
            fixed_keys,
            category_of: HashMap::new(),
        }
    }

    /// Rules matching the eligibility form and the reasoning worker shipped today.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for (canonical, aliases) in FIELDS {
            table.canonical_of.insert(canonical.to_string(), canonical.to_string());
            for alias in *aliases {
                table.canonical_of.insert(alias.to_string(), canonical.to_string());
            }
        }
        for (label, code) in CATEGORIES {
            table.category_of.insert(label.to_string(), CategoryCode::new(*code));
        }
        table
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AliasTableError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Builds a table from `{"fields": {canonical: [aliases]}, "categories": {label: code}}`.
    pub fn from_json(document: &str) -> Result<Self, AliasTableError> {
        let document: AliasTableDocument = serde_json::from_str(document)?;
        let mut table = Self::empty();

        for (canonical, aliases) in &document.fields {
            let aliases: Vec<&str> = aliases.iter().map(String::as_str).collect();
            table.register_field(canonical, &aliases)?;
        }
        for (label, code) in &document.categories {
            table.register_category(label, code)?;
        }

        Ok(table)
    }

    /// Registers a canonical field and the legacy names that collapse onto it.
    /// Nothing is registered unless every name is accepted.
    pub fn register_field(
        &mut self,
        canonical: &str,
        aliases: &[&str],
    ) -> Result<(), AliasTableError> {
        let names = || std::iter::once(canonical).chain(aliases.iter().copied());

        for name in names() {
            // Fixed keys are matched first during normalization, so such a rule could never fire.
            if self.fixed_keys.contains_key(name) {
                return Err(AliasTableError::ShadowsFixedKey {
                    name: name.to_string(),
                });
            }
            if let Some(existing) = self.canonical_of.get(name) {
                if existing != canonical {
                    return Err(AliasTableError::ConflictingAlias {
                        alias: name.to_string(),
                        existing: existing.clone(),
                        requested: canonical.to_string(),
                    });
                }
            }
        }

        for name in names() {
            self.canonical_of
                .insert(name.to_string(), canonical.to_string());
        }
        Ok(())
    }

    pub fn register_category(&mut self, label: &str, code: &str) -> Result<(), AliasTableError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AliasTableError::EmptyCategoryCode {
                label: label.to_string(),
            });
        }
        self.category_of
            .insert(label.to_string(), CategoryCode::new(code));
        Ok(())
    }

    pub fn canonical_of(&self, key: &str) -> Option<&str> {
        self.canonical_of.get(key).map(String::as_str)
    }

    pub fn fixed_field(&self, key: &str) -> Option<FixedField> {
        self.fixed_keys.get(key).copied()
    }

    pub fn category_of(&self, visa_type: &str) -> Option<&CategoryCode> {
        self.category_of.get(visa_type)
    }

    /// Keys that count as legacy aliases, i.e. resolve to a different name.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.canonical_of
            .iter()
            .filter(|(alias, canonical)| alias != canonical)
            .map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &CategoryCode)> {
        self.category_of
            .iter()
            .map(|(label, code)| (label.as_str(), code))
    }
}

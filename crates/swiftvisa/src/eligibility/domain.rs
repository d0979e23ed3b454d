use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Profile exactly as the client submitted it. Key order is preserved so the
/// normalizer can apply its last-write-wins collision rule deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProfile(Map<String, Value>);

impl RawProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawProfile {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl FromIterator<(String, Value)> for RawProfile {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Short identifier of a visa type's field bucket, e.g. `f1` or `h1b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCode(String);

impl CategoryCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-level attributes that never land in a category bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedField {
    Age,
    Nationality,
    Education,
    Employment,
    Income,
    VisaType,
}

impl FixedField {
    pub const ALL: [FixedField; 6] = [
        FixedField::Age,
        FixedField::Nationality,
        FixedField::Education,
        FixedField::Employment,
        FixedField::Income,
        FixedField::VisaType,
    ];

    /// Key used for the attribute on the worker wire format.
    pub fn wire_key(self) -> &'static str {
        match self {
            FixedField::Age => "age",
            FixedField::Nationality => "nationality",
            FixedField::Education => "education",
            FixedField::Employment => "employment",
            FixedField::Income => "income",
            FixedField::VisaType => "visa_type",
        }
    }
}

/// Visa-type specific fields, keyed by exactly one category code.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBucket {
    category: CategoryCode,
    fields: Map<String, Value>,
}

impl CategoryBucket {
    pub fn new(category: CategoryCode) -> Self {
        Self {
            category,
            fields: Map::new(),
        }
    }

    pub fn category(&self) -> &CategoryCode {
        &self.category
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub(crate) fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        self.fields.insert(key, value)
    }
}

impl Serialize for CategoryBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.category.as_str(), &self.fields)?;
        map.end()
    }
}

/// Request body handed to the reasoning worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income: Option<Value>,
    pub visa_type: Value,
    pub extra: CategoryBucket,
}

impl NormalizedProfile {
    pub(crate) fn new(visa_type: Value, extra: CategoryBucket) -> Self {
        Self {
            age: None,
            nationality: None,
            education: None,
            employment: None,
            income: None,
            visa_type,
            extra,
        }
    }

    pub fn category(&self) -> &CategoryCode {
        self.extra.category()
    }

    pub fn fixed(&self, field: FixedField) -> Option<&Value> {
        match field {
            FixedField::Age => self.age.as_ref(),
            FixedField::Nationality => self.nationality.as_ref(),
            FixedField::Education => self.education.as_ref(),
            FixedField::Employment => self.employment.as_ref(),
            FixedField::Income => self.income.as_ref(),
            FixedField::VisaType => Some(&self.visa_type),
        }
    }

    pub(crate) fn set_fixed(&mut self, field: FixedField, value: Value) {
        match field {
            FixedField::Age => self.age = Some(value),
            FixedField::Nationality => self.nationality = Some(value),
            FixedField::Education => self.education = Some(value),
            FixedField::Employment => self.employment = Some(value),
            FixedField::Income => self.income = Some(value),
            FixedField::VisaType => self.visa_type = value,
        }
    }
}

/// Verdict labels the worker documents. The worker may emit others; those
/// are still forwarded, they just have no typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    LikelyEligible,
    LikelyIneligible,
    Uncertain,
    InsufficientData,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::LikelyEligible,
        Decision::LikelyIneligible,
        Decision::Uncertain,
        Decision::InsufficientData,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Decision::LikelyEligible => "Likely Eligible",
            Decision::LikelyIneligible => "Likely Ineligible",
            Decision::Uncertain => "Uncertain",
            Decision::InsufficientData => "Insufficient Data",
        }
    }

    /// Matches a documented label, ignoring ASCII case.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|decision| decision.label().eq_ignore_ascii_case(label))
    }
}

/// Keys every worker verdict must carry.
pub const REQUIRED_RESULT_KEYS: [&str; 2] = ["decision", "explanation"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultShapeError {
    #[error("worker output must be a JSON object")]
    NotAnObject,
    #[error("worker output is missing the `{0}` key")]
    MissingKey(&'static str),
}

/// Worker verdict, kept exactly as the worker emitted it.
///
/// Only the object shape and the presence of `decision` and `explanation`
/// are checked. Values are never coerced, so unknown labels, float citation
/// indices and explicit `null`s reach the caller untouched. The accessors are
/// typed views over the raw object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EligibilityResult(Map<String, Value>);

impl EligibilityResult {
    pub fn new(decision: impl Into<String>, explanation: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("decision".to_string(), Value::String(decision.into()));
        body.insert("explanation".to_string(), Value::String(explanation.into()));
        Self(body)
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn from_value(value: Value) -> Result<Self, ResultShapeError> {
        match value {
            Value::Object(body) => Self::from_map(body),
            _ => Err(ResultShapeError::NotAnObject),
        }
    }

    pub fn from_map(body: Map<String, Value>) -> Result<Self, ResultShapeError> {
        if let Some(key) = REQUIRED_RESULT_KEYS
            .into_iter()
            .find(|key| !body.contains_key(*key))
        {
            return Err(ResultShapeError::MissingKey(key));
        }
        Ok(Self(body))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Raw decision label when the worker sent a string.
    pub fn decision_label(&self) -> Option<&str> {
        self.0.get("decision").and_then(Value::as_str)
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision_label().and_then(Decision::from_label)
    }

    pub fn explanation(&self) -> Option<&str> {
        self.0.get("explanation").and_then(Value::as_str)
    }

    pub fn confidence_score(&self) -> Option<f64> {
        self.0.get("confidence").and_then(Value::as_f64)
    }

    pub fn citations(&self) -> Option<&[Value]> {
        self.0
            .get("citations")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    pub fn missing_information(&self) -> Option<&[Value]> {
        self.0
            .get("missing_information")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }
}

impl<'de> Deserialize<'de> for EligibilityResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_serializes_under_its_category_code() {
        let mut bucket = CategoryBucket::new(CategoryCode::new("f1"));
        bucket.insert("school_name".to_string(), json!("MIT"));

        let value = serde_json::to_value(&bucket).expect("serialize bucket");
        assert_eq!(value, json!({ "f1": { "school_name": "MIT" } }));
    }

    #[test]
    fn normalized_profile_omits_absent_fixed_fields() {
        let mut profile =
            NormalizedProfile::new(json!("H1B Work"), CategoryBucket::new(CategoryCode::new("h1b")));
        profile.set_fixed(FixedField::Age, json!("31"));

        let value = serde_json::to_value(&profile).expect("serialize profile");
        assert_eq!(
            value,
            json!({ "age": "31", "visa_type": "H1B Work", "extra": { "h1b": {} } })
        );
    }

    #[test]
    fn result_keeps_unknown_worker_keys() {
        let raw = json!({
            "decision": "Insufficient Data",
            "explanation": "need the I-20 status",
            "confidence": 30,
            "citations": [1, "uscis-f1"],
            "missing_information": ["f1.i20_issued"],
            "docs_used": [{ "id": "uscis-f1" }]
        });

        let result: EligibilityResult = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(result.decision(), Some(Decision::InsufficientData));
        assert_eq!(result.citations(), Some(&[json!(1), json!("uscis-f1")][..]));
        assert_eq!(result.confidence_score(), Some(30.0));
        assert!(result.get("docs_used").is_some());
        assert_eq!(serde_json::to_value(&result).expect("serialize"), raw);
    }

    #[test]
    fn result_forwards_values_it_has_no_view_for() {
        let raw = json!({
            "decision": "Likely eligible",
            "explanation": "funds shown",
            "confidence": null,
            "citations": [1.0, 2.5],
            "missing_information": null
        });

        let result: EligibilityResult = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(result.decision_label(), Some("Likely eligible"));
        assert_eq!(result.decision(), Some(Decision::LikelyEligible));
        assert_eq!(result.confidence_score(), None);
        assert_eq!(serde_json::to_value(&result).expect("serialize"), raw);

        let odd: EligibilityResult =
            serde_json::from_value(json!({ "decision": "Maybe", "explanation": "" }))
                .expect("unknown labels are forwarded");
        assert_eq!(odd.decision(), None);
        assert_eq!(odd.decision_label(), Some("Maybe"));
    }

    #[test]
    fn result_requires_an_object_with_decision_and_explanation() {
        assert_eq!(
            EligibilityResult::from_value(json!({ "explanation": "no label" })),
            Err(ResultShapeError::MissingKey("decision"))
        );
        assert_eq!(
            EligibilityResult::from_value(json!({ "decision": "Uncertain" })),
            Err(ResultShapeError::MissingKey("explanation"))
        );
        assert_eq!(
            EligibilityResult::from_value(json!(["Uncertain"])),
            Err(ResultShapeError::NotAnObject)
        );
        assert!(serde_json::from_str::<EligibilityResult>(r#""Uncertain""#).is_err());
    }
}

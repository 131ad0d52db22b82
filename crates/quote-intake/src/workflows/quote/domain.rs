use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the lead store on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Line of coverage the prospect is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceType {
    Auto,
    Home,
    Commercial,
}

impl InsuranceType {
    pub const ALL: [InsuranceType; 3] = [Self::Auto, Self::Home, Self::Commercial];

    pub const fn as_str(self) -> &'static str {
        match self {
            InsuranceType::Auto => "auto",
            InsuranceType::Home => "home",
            InsuranceType::Commercial => "commercial",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            InsuranceType::Auto => "Auto",
            InsuranceType::Home => "Home",
            InsuranceType::Commercial => "Commercial",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "auto" => Some(Self::Auto),
            "home" => Some(Self::Home),
            "commercial" => Some(Self::Commercial),
            _ => None,
        }
    }
}

/// Vehicles on the household policy. Wire form is "1", "2", "3" or "4+".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleCount {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4+")]
    FourOrMore,
}

impl VehicleCount {
    pub const fn as_str(self) -> &'static str {
        match self {
            VehicleCount::One => "1",
            VehicleCount::Two => "2",
            VehicleCount::Three => "3",
            VehicleCount::FourOrMore => "4+",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1" => Some(Self::One),
            "2" => Some(Self::Two),
            "3" => Some(Self::Three),
            "4+" => Some(Self::FourOrMore),
            _ => None,
        }
    }
}

/// Fields that only exist for a particular insurance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "insurance_type", rename_all = "lowercase")]
pub enum CoverageDetails {
    Auto { vehicle_count: Option<VehicleCount> },
    Home { property_address: String },
    Commercial,
}

impl CoverageDetails {
    pub fn empty(insurance_type: InsuranceType) -> Self {
        match insurance_type {
            InsuranceType::Auto => CoverageDetails::Auto {
                vehicle_count: None,
            },
            InsuranceType::Home => CoverageDetails::Home {
                property_address: String::new(),
            },
            InsuranceType::Commercial => CoverageDetails::Commercial,
        }
    }

    pub fn insurance_type(&self) -> InsuranceType {
        match self {
            CoverageDetails::Auto { .. } => InsuranceType::Auto,
            CoverageDetails::Home { .. } => InsuranceType::Home,
            CoverageDetails::Commercial => InsuranceType::Commercial,
        }
    }

    /// Property address as stored, `None` when absent or blank.
    pub fn property_address(&self) -> Option<&str> {
        match self {
            CoverageDetails::Home { property_address } if !property_address.is_empty() => {
                Some(property_address.as_str())
            }
            _ => None,
        }
    }

    pub fn vehicle_count(&self) -> Option<VehicleCount> {
        match self {
            CoverageDetails::Auto { vehicle_count } => *vehicle_count,
            _ => None,
        }
    }
}

/// Declarations page picked by the prospect.
#[derive(Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PolicyDocument {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn metadata(&self) -> DocumentMetadata {
        let kind = if self.content_type == mime::APPLICATION_PDF.essence_str() {
            "PDF"
        } else {
            "Image"
        };

        DocumentMetadata {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size(),
            kind,
        }
    }
}

impl fmt::Debug for PolicyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyDocument")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Document description without the payload, safe to hand back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub kind: &'static str,
}

/// Everything the wizard collects from a prospect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadRecord {
    pub coverage: Option<CoverageDetails>,
    pub start_date: Option<NaiveDate>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub document: Option<PolicyDocument>,
}

impl LeadRecord {
    pub fn insurance_type(&self) -> Option<InsuranceType> {
        self.coverage.as_ref().map(CoverageDetails::insurance_type)
    }

    /// Merge a partial update. The insurance type is applied first so that
    /// conditional fields in the same patch land on the new coverage.
    pub fn apply(&mut self, patch: LeadPatch) {
        let LeadPatch {
            insurance_type,
            start_date,
            full_name,
            email,
            phone,
            property_address,
            vehicle_count,
            document,
        } = patch;

        if let Some(insurance_type) = insurance_type {
            if self.insurance_type() != Some(insurance_type) {
                self.coverage = Some(CoverageDetails::empty(insurance_type));
            }
        }
        if let Some(start_date) = start_date {
            self.start_date = Some(start_date);
        }
        if let Some(full_name) = full_name {
            self.full_name = full_name;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(phone) = phone {
            self.phone = phone;
        }

        match (&mut self.coverage, property_address, vehicle_count) {
            (Some(CoverageDetails::Home { property_address }), Some(address), _) => {
                *property_address = address;
            }
            (Some(CoverageDetails::Auto { vehicle_count }), _, Some(count)) => {
                *vehicle_count = Some(count);
            }
            _ => {}
        }

        if let Some(document) = document {
            self.document = document;
        }
    }
}

/// Partial update sent by a step view. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(default)]
    pub insurance_type: Option<InsuranceType>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub property_address: Option<String>,
    #[serde(default)]
    pub vehicle_count: Option<VehicleCount>,
    /// `Some(None)` removes the current document.
    #[serde(skip)]
    pub document: Option<Option<PolicyDocument>>,
}

impl LeadPatch {
    pub fn insurance_type(value: InsuranceType) -> Self {
        Self {
            insurance_type: Some(value),
            ..Self::default()
        }
    }

    pub fn start_date(value: NaiveDate) -> Self {
        Self {
            start_date: Some(value),
            ..Self::default()
        }
    }

    pub fn contact(
        full_name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            full_name: Some(full_name.into()),
            email: Some(email.into()),
            phone: Some(phone.into()),
            ..Self::default()
        }
    }

    pub fn property_address(value: impl Into<String>) -> Self {
        Self {
            property_address: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn vehicle_count(value: VehicleCount) -> Self {
        Self {
            vehicle_count: Some(value),
            ..Self::default()
        }
    }

    pub fn attach_document(document: PolicyDocument) -> Self {
        Self {
            document: Some(Some(document)),
            ..Self::default()
        }
    }

    pub fn remove_document() -> Self {
        Self {
            document: Some(None),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The four wizard screens, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    InsuranceType = 1,
    StartDate = 2,
    ContactInfo = 3,
    Documents = 4,
}

pub const TOTAL_STEPS: u8 = 4;

impl WizardStep {
    pub const ALL: [WizardStep; 4] = [
        Self::InsuranceType,
        Self::StartDate,
        Self::ContactInfo,
        Self::Documents,
    ];

    pub const fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::InsuranceType),
            2 => Some(Self::StartDate),
            3 => Some(Self::ContactInfo),
            4 => Some(Self::Documents),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WizardStep::InsuranceType => "Insurance Type",
            WizardStep::StartDate => "Start Date",
            WizardStep::ContactInfo => "Your Info",
            WizardStep::Documents => "Documents",
        }
    }

    /// Next step, saturating at the final one.
    pub fn next(self) -> Self {
        Self::from_number(self.number() + 1).unwrap_or(Self::Documents)
    }

    /// Previous step, saturating at the first one.
    pub fn previous(self) -> Self {
        Self::from_number(self.number().saturating_sub(1)).unwrap_or(Self::InsuranceType)
    }

    pub const fn is_final(self) -> bool {
        matches!(self, WizardStep::Documents)
    }

    pub fn progress_percent(self) -> u8 {
        let ratio = f64::from(self.number()) / f64::from(TOTAL_STEPS);
        (ratio * 100.0).round() as u8
    }
}

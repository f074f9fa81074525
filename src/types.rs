use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Record collections exposed by the records API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    #[value(alias = "officers")]
    PoliceOfficers,
    #[value(alias = "posts")]
    PolicePosts,
    Cases,
    Charges,
    Suspects,
    Victims,
    Examinations,
    #[value(alias = "facilities")]
    HealthFacilities,
    #[value(alias = "practitioners")]
    HealthPractitioners,
    Notifications,
}

/// A field holding the id of a record in another collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub field: &'static str,
    pub target: Resource,
}

impl ForeignKey {
    const fn new(field: &'static str, target: Resource) -> Self {
        Self { field, target }
    }

    /// Name under which the resolved record is attached (`officer_id` -> `officer`)
    pub fn relation_name(&self) -> &'static str {
        self.field.strip_suffix("_id").unwrap_or(self.field)
    }
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::PoliceOfficers,
        Resource::PolicePosts,
        Resource::Cases,
        Resource::Charges,
        Resource::Suspects,
        Resource::Victims,
        Resource::Examinations,
        Resource::HealthFacilities,
        Resource::HealthPractitioners,
        Resource::Notifications,
    ];

    /// Collection route, relative to the API base URL
    pub fn path(&self) -> &'static str {
        match self {
            Resource::PoliceOfficers => "/police-officers",
            Resource::PolicePosts => "/police-posts",
            Resource::Cases => "/cases",
            Resource::Charges => "/charges",
            Resource::Suspects => "/suspects",
            Resource::Victims => "/victims",
            Resource::Examinations => "/examinations",
            Resource::HealthFacilities => "/health-facilities",
            Resource::HealthPractitioners => "/health-practitioners",
            Resource::Notifications => "/notifications",
        }
    }

    /// Route of a single record
    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resource::PoliceOfficers => "Police officers",
            Resource::PolicePosts => "Police posts",
            Resource::Cases => "Cases",
            Resource::Charges => "Charges",
            Resource::Suspects => "Suspects",
            Resource::Victims => "Victims",
            Resource::Examinations => "Examinations",
            Resource::HealthFacilities => "Health facilities",
            Resource::HealthPractitioners => "Health practitioners",
            Resource::Notifications => "Notifications",
        }
    }

    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        use Resource::*;

        const OFFICER: &[ForeignKey] = &[ForeignKey::new("police_post_id", PolicePosts)];
        const CASE: &[ForeignKey] = &[
            ForeignKey::new("officer_id", PoliceOfficers),
            ForeignKey::new("police_post_id", PolicePosts),
        ];
        const CASE_CHILD: &[ForeignKey] = &[ForeignKey::new("case_id", Cases)];
        const EXAMINATION: &[ForeignKey] = &[
            ForeignKey::new("case_id", Cases),
            ForeignKey::new("victim_id", Victims),
            ForeignKey::new("health_facility_id", HealthFacilities),
            ForeignKey::new("health_practitioner_id", HealthPractitioners),
        ];
        const PRACTITIONER: &[ForeignKey] =
            &[ForeignKey::new("health_facility_id", HealthFacilities)];

        match self {
            PoliceOfficers => OFFICER,
            Cases => CASE,
            Charges | Suspects | Victims => CASE_CHILD,
            Examinations => EXAMINATION,
            HealthPractitioners => PRACTITIONER,
            PolicePosts | HealthFacilities | Notifications => &[],
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

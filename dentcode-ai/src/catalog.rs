//! Built-in code catalog
//!
//! CDT procedure categories (the twelve standard sections of D0100-D9999) and
//! the ICD-10-CM diagnosis ranges most often reported with dental claims.
//! Each category lists the subtopic ranges its overview may select; the
//! range strings double as registry discriminators.

use crate::llm::CompletionModel;
use crate::prompts::{GenerationSettings, PromptActivation, PromptTemplate};
use crate::subtopics::{RegistryOptions, SubtopicRegistry};
use crate::topics::TopicCategory;
use crate::types::{Activation, RegistrationError};
use std::sync::Arc;
use tracing::debug;

/// One subtopic: a code range and its display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtopicSpec {
    pub code_range: &'static str,
    pub name: &'static str,
}

/// One parent category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySpec {
    pub name: &'static str,
    pub code_range: &'static str,
    pub subtopics: &'static [SubtopicSpec],
}

/// Code system a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSystem {
    Cdt,
    Icd10,
}

impl CodeSystem {
    pub fn categories(self) -> &'static [CategorySpec] {
        match self {
            CodeSystem::Cdt => CDT_CATEGORIES,
            CodeSystem::Icd10 => ICD_CATEGORIES,
        }
    }

    /// Category whose range matches, ignoring case and surrounding space
    pub fn find(self, code_range: &str) -> Option<&'static CategorySpec> {
        let wanted = code_range.trim();
        self.categories()
            .iter()
            .find(|c| c.code_range.eq_ignore_ascii_case(wanted))
    }
}

const fn sub(code_range: &'static str, name: &'static str) -> SubtopicSpec {
    SubtopicSpec { code_range, name }
}

// ============================================================================
// CDT
// ============================================================================

pub static CDT_CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        name: "Diagnostic",
        code_range: "D0100-D0999",
        subtopics: &[
            sub("D0120-D0180", "Clinical Oral Evaluations"),
            sub("D0190-D0191", "Pre-diagnostic Services"),
            sub("D0210-D0391", "Diagnostic Imaging"),
            sub("D0393-D0395", "Post Processing of Image or Image Sets"),
            sub("D0411-D0460", "Tests and Examinations"),
            sub("D0470-D0999", "Oral Pathology Laboratory"),
        ],
    },
    CategorySpec {
        name: "Preventive",
        code_range: "D1000-D1999",
        subtopics: &[
            sub("D1110-D1120", "Dental Prophylaxis"),
            sub("D1206-D1208", "Topical Fluoride Treatment"),
            sub("D1310-D1355", "Other Preventive Services"),
            sub("D1510-D1575", "Space Maintenance"),
            sub("D1701-D1999", "Vaccinations and Other Preventive Procedures"),
        ],
    },
    CategorySpec {
        name: "Restorative",
        code_range: "D2000-D2999",
        subtopics: &[
            sub("D2140-D2161", "Amalgam Restorations"),
            sub("D2330-D2394", "Resin-Based Composite Restorations"),
            sub("D2410-D2430", "Gold Foil Restorations"),
            sub("D2510-D2664", "Inlay/Onlay Restorations"),
            sub("D2710-D2799", "Crowns - Single Restorations Only"),
            sub("D2910-D2999", "Other Restorative Services"),
        ],
    },
    CategorySpec {
        name: "Endodontics",
        code_range: "D3000-D3999",
        subtopics: &[
            sub("D3110-D3120", "Pulp Capping"),
            sub("D3220-D3240", "Pulpotomy and Primary Tooth Endodontics"),
            sub("D3310-D3333", "Endodontic Therapy"),
            sub("D3346-D3348", "Endodontic Retreatment"),
            sub("D3351-D3357", "Apexification and Pulpal Regeneration"),
            sub("D3410-D3470", "Apicoectomy/Periradicular Services"),
            sub("D3910-D3999", "Other Endodontic Procedures"),
        ],
    },
    CategorySpec {
        name: "Periodontics",
        code_range: "D4000-D4999",
        subtopics: &[
            sub("D4210-D4286", "Surgical Periodontal Services"),
            sub("D4341-D4381", "Non-Surgical Periodontal Services"),
            sub("D4910-D4999", "Other Periodontal Services"),
        ],
    },
    CategorySpec {
        name: "Prosthodontics, Removable",
        code_range: "D5000-D5899",
        subtopics: &[
            sub("D5110-D5140", "Complete Dentures"),
            sub("D5211-D5286", "Partial Dentures"),
            sub("D5410-D5422", "Adjustments to Dentures"),
            sub("D5511-D5671", "Repairs to Dentures"),
            sub("D5710-D5899", "Denture Rebase, Reline and Other Services"),
        ],
    },
    CategorySpec {
        name: "Maxillofacial Prosthetics",
        code_range: "D5900-D5999",
        subtopics: &[
            sub("D5911-D5937", "Facial and Intraoral Prostheses"),
            sub("D5951-D5999", "Appliances, Splints and Other Services"),
        ],
    },
    CategorySpec {
        name: "Implant Services",
        code_range: "D6000-D6199",
        subtopics: &[
            sub("D6010-D6049", "Surgical Implant Services"),
            sub("D6050-D6099", "Implant Supported Prosthetics"),
            sub("D6100-D6199", "Other Implant Services"),
        ],
    },
    CategorySpec {
        name: "Prosthodontics, Fixed",
        code_range: "D6200-D6999",
        subtopics: &[
            sub("D6205-D6253", "Fixed Partial Denture Pontics"),
            sub("D6545-D6634", "Fixed Partial Denture Retainers - Inlays/Onlays"),
            sub("D6710-D6794", "Fixed Partial Denture Retainers - Crowns"),
            sub("D6920-D6999", "Other Fixed Partial Denture Services"),
        ],
    },
    CategorySpec {
        name: "Oral and Maxillofacial Surgery",
        code_range: "D7000-D7999",
        subtopics: &[
            sub("D7111-D7140", "Extractions"),
            sub("D7210-D7251", "Surgical Extractions"),
            sub("D7260-D7297", "Other Surgical Procedures"),
            sub("D7310-D7321", "Alveoloplasty"),
            sub("D7410-D7490", "Excision of Lesions and Bone Tissue"),
            sub("D7510-D7560", "Surgical Incision"),
            sub("D7610-D7780", "Treatment of Fractures"),
            sub("D7810-D7899", "Temporomandibular Joint Dysfunctions"),
            sub("D7910-D7999", "Repair Procedures and Other Surgical Services"),
        ],
    },
    CategorySpec {
        name: "Orthodontics",
        code_range: "D8000-D8999",
        subtopics: &[
            sub("D8010-D8040", "Limited Orthodontic Treatment"),
            sub("D8070-D8090", "Comprehensive Orthodontic Treatment"),
            sub("D8210-D8220", "Minor Treatment to Control Harmful Habits"),
            sub("D8660-D8999", "Other Orthodontic Services"),
        ],
    },
    CategorySpec {
        name: "Adjunctive General Services",
        code_range: "D9000-D9999",
        subtopics: &[
            sub("D9110-D9130", "Unclassified Treatment"),
            sub("D9210-D9248", "Anesthesia"),
            sub("D9310-D9311", "Professional Consultation"),
            sub("D9410-D9450", "Professional Visits"),
            sub("D9610-D9630", "Drugs"),
            sub("D9910-D9999", "Miscellaneous Services"),
        ],
    },
];

// ============================================================================
// ICD-10-CM
// ============================================================================

pub static ICD_CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        name: "Diseases of Teeth and Supporting Structures",
        code_range: "K00-K08",
        subtopics: &[
            sub("K00", "Disorders of Tooth Development and Eruption"),
            sub("K01", "Embedded and Impacted Teeth"),
            sub("K02", "Dental Caries"),
            sub("K03", "Other Diseases of Hard Tissues of Teeth"),
            sub("K04", "Diseases of Pulp and Periapical Tissues"),
            sub("K05", "Gingivitis and Periodontal Diseases"),
            sub("K06", "Other Disorders of Gingiva and Edentulous Alveolar Ridge"),
            sub("K08", "Other Disorders of Teeth and Supporting Structures"),
        ],
    },
    CategorySpec {
        name: "Diseases of Jaws, Salivary Glands and Oral Mucosa",
        code_range: "K09-K14",
        subtopics: &[
            sub("K09", "Cysts of Oral Region"),
            sub("K11", "Diseases of Salivary Glands"),
            sub("K12", "Stomatitis and Related Lesions"),
            sub("K13", "Other Diseases of Lip and Oral Mucosa"),
            sub("K14", "Diseases of Tongue"),
        ],
    },
    CategorySpec {
        name: "Dentofacial Anomalies and Jaw Disorders",
        code_range: "M26-M27",
        subtopics: &[
            sub("M26.0-M26.5", "Jaw Size, Jaw-Cranial Base and Dental Arch Anomalies"),
            sub("M26.6", "Temporomandibular Joint Disorders"),
            sub("M26.7-M26.9", "Dental Alveolar Anomalies and Other Dentofacial Conditions"),
            sub("M27", "Other Diseases of Jaws"),
        ],
    },
    CategorySpec {
        name: "Injuries of the Head",
        code_range: "S00-S09",
        subtopics: &[
            sub("S01.5", "Open Wound of Lip and Oral Cavity"),
            sub("S02.5", "Fracture of Tooth"),
            sub("S02.6", "Fracture of Mandible"),
            sub("S03.2", "Dislocation of Tooth"),
        ],
    },
    CategorySpec {
        name: "Symptoms and Signs",
        code_range: "R00-R99",
        subtopics: &[
            sub("R19.6", "Halitosis"),
            sub("R68.2", "Dry Mouth, Unspecified"),
            sub("R68.84", "Jaw Pain"),
        ],
    },
    CategorySpec {
        name: "Factors Influencing Health Status",
        code_range: "Z00-Z99",
        subtopics: &[
            sub("Z01.2", "Encounter for Dental Examination and Cleaning"),
            sub("Z46.3", "Fitting and Adjustment of Dental Prosthetic Device"),
            sub("Z91.84", "Risk for Dental Disease"),
            sub("Z97.2", "Presence of Dental Prosthetic Device"),
            sub("Z98.81", "Dental Procedure Status"),
        ],
    },
];

// ============================================================================
// Factory
// ============================================================================

/// Categories for every CDT section
pub fn build_cdt_categories(
    model: Arc<dyn CompletionModel>,
    options: RegistryOptions,
    settings: &GenerationSettings,
) -> Result<Vec<TopicCategory>, RegistrationError> {
    build_categories(CDT_CATEGORIES, model, options, settings)
}

/// Categories for the dental ICD-10-CM ranges
pub fn build_icd_categories(
    model: Arc<dyn CompletionModel>,
    options: RegistryOptions,
    settings: &GenerationSettings,
) -> Result<Vec<TopicCategory>, RegistrationError> {
    build_categories(ICD_CATEGORIES, model, options, settings)
}

/// One [`TopicCategory`] per catalog entry, one prompt activation per subtopic
pub fn build_categories(
    specs: &[CategorySpec],
    model: Arc<dyn CompletionModel>,
    options: RegistryOptions,
    settings: &GenerationSettings,
) -> Result<Vec<TopicCategory>, RegistrationError> {
    specs
        .iter()
        .map(|spec| build_category(spec, Arc::clone(&model), options, settings))
        .collect()
}

fn build_category(
    spec: &CategorySpec,
    model: Arc<dyn CompletionModel>,
    options: RegistryOptions,
    settings: &GenerationSettings,
) -> Result<TopicCategory, RegistrationError> {
    let mut registry = SubtopicRegistry::with_options(spec.name, options);
    for subtopic in spec.subtopics {
        let activation = PromptActivation::new(
            Arc::clone(&model),
            PromptTemplate::subtopic(),
            settings.clone(),
            subtopic.name,
            subtopic.code_range,
        );
        registry.register(
            subtopic.code_range,
            Activation::Async(Arc::new(activation)),
            subtopic.name,
        )?;
    }

    let overview = PromptActivation::new(
        model,
        PromptTemplate::overview(spec.subtopics.iter().map(|s| (s.code_range, s.name))),
        settings.clone(),
        spec.name,
        spec.code_range,
    );

    debug!(
        category = spec.name,
        subtopics = registry.len(),
        "Category registered"
    );
    Ok(TopicCategory::new(spec.name, spec.code_range, overview, registry))
}

/// `- <range>: <name>` listing used in classification prompts
pub fn category_listing(system: CodeSystem) -> String {
    system
        .categories()
        .iter()
        .map(|c| format!("- {}: {}", c.code_range, c.name))
        .collect::<Vec<_>>()
        .join("\n")
}

//! Disease categories: the search domains a run fills quotas for.

use serde::{Deserialize, Serialize};

/// A named search domain with an ordered list of query terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseCategory {
    /// Directory and file stem, e.g. `Anorectal_Disease`.
    pub key: String,

    /// Human-readable name used in reports. Falls back to `key`.
    #[serde(default)]
    pub label: Option<String>,

    /// Query terms, searched in declared order.
    pub search_terms: Vec<String>,

    /// Per-category quota; overrides `papers_per_category` when set.
    #[serde(default)]
    pub target: Option<usize>,
}

impl DiseaseCategory {
    pub fn new(key: &str, terms: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: None,
            search_terms: terms.iter().map(|t| t.to_string()).collect(),
            target: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }

    pub fn target_or(&self, default_target: usize) -> usize {
        self.target.unwrap_or(default_target)
    }
}

/// The nineteen categories harvested when the configuration lists none.
pub fn builtin_categories() -> Vec<DiseaseCategory> {
    vec![
        DiseaseCategory::new("Gynecology", &[
            "gynecology", "gynecological disease", "endometriosis", "uterine fibroids",
            "polycystic ovary syndrome", "ovarian cyst", "cervicitis", "vaginitis",
            "menstrual disorder", "pelvic inflammatory disease",
        ]),
        DiseaseCategory::new("Obstetrics", &[
            "obstetrics", "pregnancy", "prenatal care", "gestational diabetes", "preeclampsia",
            "cesarean section", "preterm birth", "postpartum", "fetal development", "maternal health",
        ]),
        DiseaseCategory::new("Influenza", &[
            "influenza", "flu virus", "influenza treatment", "influenza vaccine", "seasonal flu",
            "H1N1", "influenza prevention", "antiviral influenza", "influenza pandemic",
        ]),
        DiseaseCategory::new("Anorectal_Disease", &[
            "hemorrhoids", "anal fissure", "anal fistula", "rectal prolapse", "anorectal disease",
            "proctology", "perianal abscess", "colorectal surgery", "anal disorder",
        ])
        .with_label("Anorectal Disease"),
        DiseaseCategory::new("Cerebrovascular", &[
            "cerebrovascular disease", "stroke", "cerebral infarction", "cerebral hemorrhage",
            "transient ischemic attack", "carotid stenosis", "intracranial aneurysm",
            "cerebral ischemia", "brain vascular",
        ]),
        DiseaseCategory::new("Neurasthenia", &[
            "neurasthenia", "chronic fatigue syndrome", "nervous exhaustion", "mental fatigue",
            "nervous debility", "fatigue disorder", "psychasthenia", "nervous breakdown",
            "burnout syndrome",
        ]),
        DiseaseCategory::new("Cervical_Spondylosis", &[
            "cervical spondylosis", "cervical disc disease", "neck pain", "cervical radiculopathy",
            "cervical myelopathy", "cervical spine disorder", "cervical disc herniation",
            "cervical degenerative", "cervical vertebra",
        ])
        .with_label("Cervical Spondylosis"),
        DiseaseCategory::new("Lumbar_Muscle_Strain", &[
            "lumbar muscle strain", "lower back pain", "chronic low back pain", "lumbar strain",
            "back muscle injury", "lumbago", "myofascial pain lumbar", "lumbar sprain",
            "paraspinal muscle",
        ])
        .with_label("Lumbar Muscle Strain"),
        DiseaseCategory::new("Frozen_Shoulder", &[
            "frozen shoulder", "adhesive capsulitis", "periarthritis shoulder", "shoulder pain",
            "shoulder stiffness", "rotator cuff", "shoulder impingement", "shoulder arthritis",
            "glenohumeral",
        ])
        .with_label("Frozen Shoulder"),
        DiseaseCategory::new("Lumbar_Disc_Herniation", &[
            "lumbar disc herniation", "herniated disc", "lumbar disc prolapse", "sciatica disc",
            "intervertebral disc", "disc degeneration lumbar", "spinal disc herniation",
            "lumbar radiculopathy", "discectomy",
        ])
        .with_label("Lumbar Disc Herniation"),
        DiseaseCategory::new("Gout", &[
            "gout", "gouty arthritis", "hyperuricemia", "uric acid", "gout treatment",
            "gout flare", "tophaceous gout", "urate crystal", "gout management",
        ]),
        DiseaseCategory::new("Dentistry", &[
            "dental disease", "periodontitis", "dental caries", "tooth decay", "gingivitis",
            "oral health", "dental treatment", "endodontics", "dental implant", "toothache",
        ]),
        DiseaseCategory::new("Constipation", &[
            "constipation", "chronic constipation", "functional constipation",
            "bowel movement disorder", "laxative", "constipation treatment",
            "irritable bowel constipation", "fecal impaction", "colonic transit",
        ]),
        DiseaseCategory::new("Pharyngitis", &[
            "pharyngitis", "sore throat", "chronic pharyngitis", "acute pharyngitis",
            "streptococcal pharyngitis", "throat infection", "tonsillitis",
            "upper respiratory infection", "throat inflammation",
        ]),
        DiseaseCategory::new("Rhinitis", &[
            "rhinitis", "allergic rhinitis", "chronic rhinitis", "nasal congestion", "sinusitis",
            "rhinosinusitis", "nasal inflammation", "hay fever", "vasomotor rhinitis",
        ]),
        DiseaseCategory::new("Ulcer", &[
            "peptic ulcer", "gastric ulcer", "duodenal ulcer", "stomach ulcer", "ulcer treatment",
            "helicobacter pylori ulcer", "ulcer healing", "gastrointestinal ulcer", "ulcer disease",
        ]),
        DiseaseCategory::new("Diarrhea", &[
            "diarrhea", "acute diarrhea", "chronic diarrhea", "infectious diarrhea",
            "diarrhea treatment", "gastroenteritis", "traveler diarrhea", "antibiotic diarrhea",
            "watery stool",
        ]),
        DiseaseCategory::new("Varicose_Veins", &[
            "varicose veins", "venous insufficiency", "chronic venous disease",
            "varicose vein treatment", "venous reflux", "leg veins", "venous ulcer",
            "sclerotherapy", "endovenous ablation",
        ])
        .with_label("Varicose Veins"),
        DiseaseCategory::new("Sciatica", &[
            "sciatica", "sciatic nerve pain", "lumbar radiculopathy", "sciatic neuralgia",
            "piriformis syndrome", "nerve root compression", "leg pain radiating",
            "sciatic nerve treatment", "radicular pain",
        ]),
    ]
}

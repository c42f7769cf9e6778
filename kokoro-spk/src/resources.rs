//! Catalog of languages, model variants and voices

use crate::formula::parse_voice_formula;
use serde::Serialize;

/// Model used when none is requested
pub const DEFAULT_MODEL: &str = "model_q8f16";

/// Voice used when none is requested
pub const DEFAULT_VOICE: &str = "af_heart";

/// Language used when none can be resolved
pub const DEFAULT_LANG: &str = "en-us";

/// Model variant substituted for unknown model ids when fetching assets
pub const FALLBACK_MODEL: &str = "model";

/// Voice substituted for unknown voice ids
pub const FALLBACK_VOICE: &str = "af_alloy";

/// A phonemizer language. Ids are espeak-ng language codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lang {
    pub id: &'static str,
    pub name: &'static str,
}

/// A quantized variant of the synthesis model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Model {
    pub id: &'static str,
    pub quantization: &'static str,
    pub size: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

/// A voice embedding asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub id: &'static str,
    pub name: &'static str,
    pub lang: &'static str,
    pub gender: Gender,
    pub target_quality: &'static str,
    pub overall_grade: &'static str,
}

const fn voice(
    id: &'static str,
    name: &'static str,
    lang: &'static str,
    gender: Gender,
    target_quality: &'static str,
    overall_grade: &'static str,
) -> Voice {
    Voice {
        id,
        name,
        lang,
        gender,
        target_quality,
        overall_grade,
    }
}

pub static LANGS: &[Lang] = &[
    Lang { id: "en-us", name: "English (US)" },
    Lang { id: "en-gb", name: "English (UK)" },
    Lang { id: "ja", name: "Japanese" },
    Lang { id: "cmn", name: "Chinese" },
    Lang { id: "es-419", name: "Spanish" },
    Lang { id: "hi", name: "Hindi" },
    Lang { id: "it", name: "Italian" },
    Lang { id: "pt-br", name: "Portuguese (Brazil)" },
];

pub static MODELS: &[Model] = &[
    Model { id: "model", quantization: "fp32", size: "326 MB" },
    Model { id: "model_q4", quantization: "4-bit matmul", size: "305 MB" },
    Model { id: "model_uint8", quantization: "8-bit & mixed precision", size: "177 MB" },
    Model { id: "model_fp16", quantization: "fp16", size: "163 MB" },
    Model { id: "model_q4f16", quantization: "4-bit matmul & fp16 weights", size: "154 MB" },
    Model { id: "model_uint8f16", quantization: "Mixed precision", size: "114 MB" },
    Model { id: "model_quantized", quantization: "8-bit", size: "92.4 MB" },
    Model { id: "model_q8f16", quantization: "Mixed precision", size: "86 MB" },
];

pub static VOICES: &[Voice] = &[
    voice("af_heart", "Heart", "en-us", Gender::Female, "A", "A"),
    voice("af_alloy", "Alloy", "en-us", Gender::Female, "B", "C"),
    voice("af_aoede", "Aoede", "en-us", Gender::Female, "B", "C+"),
    voice("af_bella", "Bella", "en-us", Gender::Female, "A", "A-"),
    voice("af_jessica", "Jessica", "en-us", Gender::Female, "C", "D"),
    voice("af_kore", "Kore", "en-us", Gender::Female, "B", "C+"),
    voice("af_nicole", "Nicole", "en-us", Gender::Female, "B", "B-"),
    voice("af_nova", "Nova", "en-us", Gender::Female, "B", "C"),
    voice("af_river", "River", "en-us", Gender::Female, "C", "D"),
    voice("af_sarah", "Sarah", "en-us", Gender::Female, "B", "C+"),
    voice("af_sky", "Sky", "en-us", Gender::Female, "B", "C-"),
    voice("am_adam", "Adam", "en-us", Gender::Male, "D", "F+"),
    voice("am_echo", "Echo", "en-us", Gender::Male, "C", "D"),
    voice("am_eric", "Eric", "en-us", Gender::Male, "C", "D"),
    voice("am_fenrir", "Fenrir", "en-us", Gender::Male, "B", "C+"),
    voice("am_liam", "Liam", "en-us", Gender::Male, "C", "D"),
    voice("am_michael", "Michael", "en-us", Gender::Male, "B", "C+"),
    voice("am_onyx", "Onyx", "en-us", Gender::Male, "C", "D"),
    voice("am_puck", "Puck", "en-us", Gender::Male, "B", "C+"),
    voice("am_santa", "Santa", "en-us", Gender::Male, "C", "D-"),
    voice("bf_emma", "Emma", "en-gb", Gender::Female, "B", "B-"),
    voice("bf_isabella", "Isabella", "en-gb", Gender::Female, "B", "C"),
    voice("bm_george", "George", "en-gb", Gender::Male, "B", "C"),
    voice("bm_lewis", "Lewis", "en-gb", Gender::Male, "C", "D+"),
    voice("bf_alice", "Alice", "en-gb", Gender::Female, "C", "D"),
    voice("bf_lily", "Lily", "en-gb", Gender::Female, "C", "D"),
    voice("bm_daniel", "Daniel", "en-gb", Gender::Male, "C", "D"),
    voice("bm_fable", "Fable", "en-gb", Gender::Male, "B", "C"),
    voice("ef_dora", "Dora", "es-419", Gender::Female, "C", "D"),
    voice("em_alex", "Alex", "es-419", Gender::Male, "C", "D"),
    voice("em_santa", "Santa", "es-419", Gender::Male, "C", "D"),
    voice("jf_alpha", "Alpha", "ja", Gender::Female, "B", "C+"),
    voice("jf_gongitsune", "Gongitsune", "ja", Gender::Female, "B", "C"),
    voice("jf_nezumi", "Nezumi", "ja", Gender::Female, "B", "C-"),
    voice("jf_tebukuro", "Tebukuro", "ja", Gender::Female, "B", "C"),
    voice("jm_kumo", "Kumo", "ja", Gender::Male, "B", "C-"),
    voice("zf_xiaobei", "Xiaobei", "cmn", Gender::Female, "C", "D"),
    voice("zf_xiaoni", "Xiaoni", "cmn", Gender::Female, "C", "D"),
    voice("zf_xiaoxiao", "Xiaoxiao", "cmn", Gender::Female, "C", "D"),
    voice("zf_xiaoyi", "Xiaoyi", "cmn", Gender::Female, "C", "D"),
    voice("zm_yunjian", "Yunjian", "cmn", Gender::Male, "C", "D"),
    voice("zm_yunxi", "Yunxi", "cmn", Gender::Male, "C", "D"),
    voice("zm_yunxia", "Yunxia", "cmn", Gender::Male, "C", "D"),
    voice("zm_yunyang", "Yunyang", "cmn", Gender::Male, "C", "D"),
    voice("hf_alpha", "Alpha", "hi", Gender::Female, "B", "C"),
    voice("hf_beta", "Beta", "hi", Gender::Female, "B", "C"),
    voice("hm_omega", "Omega", "hi", Gender::Male, "B", "C"),
    voice("hm_psi", "Psi", "hi", Gender::Male, "B", "C"),
    voice("if_sara", "Sara", "it", Gender::Female, "B", "C"),
    voice("im_nicola", "Nicola", "it", Gender::Male, "B", "C"),
    voice("pf_dora", "Dora", "pt-br", Gender::Female, "C", "D"),
    voice("pm_alex", "Alex", "pt-br", Gender::Male, "C", "D"),
    voice("pm_santa", "Santa", "pt-br", Gender::Male, "C", "D"),
];

pub fn find_lang(id: &str) -> Option<&'static Lang> {
    LANGS.iter().find(|l| l.id == id)
}

pub fn find_model(id: &str) -> Option<&'static Model> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn find_voice(id: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.id == id)
}

pub fn model_ids() -> Vec<&'static str> {
    MODELS.iter().map(|m| m.id).collect()
}

pub fn voices_for_lang(lang: &str) -> impl Iterator<Item = &'static Voice> + '_ {
    VOICES.iter().filter(move |v| v.lang == lang)
}

/// Language for `id`, falling back to US English for unknown ids
pub fn resolve_lang(id: &str) -> &'static Lang {
    find_lang(id).unwrap_or(&LANGS[0])
}

/// Language of the first voice in `formula`, when that voice is in the catalog
pub fn catalog_lang_for_formula(formula: &str) -> Option<&'static Lang> {
    parse_voice_formula(formula)
        .ok()
        .and_then(|voices| voices.into_iter().next())
        .and_then(|v| find_voice(&v.voice_id))
        .map(|v| resolve_lang(v.lang))
}

/// Language of the first voice in `formula`.
///
/// Unknown voices and unparsable formulas resolve to the language of the fallback voice.
pub fn lang_for_formula(formula: &str) -> &'static Lang {
    catalog_lang_for_formula(formula).unwrap_or_else(|| {
        let voice = find_voice(FALLBACK_VOICE).map(|v| v.lang).unwrap_or(DEFAULT_LANG);
        resolve_lang(voice)
    })
}

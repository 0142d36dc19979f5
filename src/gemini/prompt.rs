// src/gemini/prompt.rs
use crate::template::TemplateField;
use std::collections::HashMap;

/// Builds the extraction prompt from the template field list.
///
/// Fields are grouped under their section headers (first-appearance order;
/// sectionless fields go under "General") so the model sees the same
/// structure the template author wrote. Field names are the JSON keys the
/// model must answer with.
pub fn build_extraction_prompt(fields: &[TemplateField]) -> String {
    let mut prompt = String::from(
        "You are an expert scientific researcher. Extract the following information from the attached PDF study.\n\
         Return the result as a valid JSON object where keys are the 'Field Name' and values are the extracted text/numbers. If information is strictly missing, use null.\n\
         Do not hallucinate data. If you are unsure, extraction is better left as null.\n\n",
    );

    let mut order: Vec<&str> = Vec::new();
    let mut sections: HashMap<&str, Vec<&TemplateField>> = HashMap::new();
    for field in fields {
        let key = field.section.as_deref().unwrap_or("General");
        if !sections.contains_key(key) {
            order.push(key);
        }
        sections.entry(key).or_default().push(field);
    }

    for section in order {
        prompt.push_str(&format!("--- {} ---\n", section));
        for field in &sections[section] {
            match &field.description {
                Some(desc) => prompt.push_str(&format!("- {}: {}\n", field.name, desc)),
                None => prompt.push_str(&format!("- {}\n", field.name)),
            }
        }
    }

    prompt.push_str("\nReturn ONLY the JSON object. No markdown formatting (like ```json), no preamble.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, section: Option<&str>, description: Option<&str>) -> TemplateField {
        TemplateField {
            name: name.to_string(),
            section: section.map(str::to_string),
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn test_fields_grouped_by_section_in_order() {
        let fields = vec![
            field("Study ID", Some("Identification"), None),
            field("Year", Some("Identification"), None),
            field("BMI", Some("Baseline"), None),
        ];
        let prompt = build_extraction_prompt(&fields);

        let ident = prompt.find("--- Identification ---").unwrap();
        let baseline = prompt.find("--- Baseline ---").unwrap();
        assert!(ident < baseline);
        assert!(prompt.contains("- Study ID\n"));
        assert!(prompt.contains("- BMI\n"));
    }

    #[test]
    fn test_sectionless_fields_fall_under_general() {
        let prompt = build_extraction_prompt(&[field("Study ID", None, None)]);
        assert!(prompt.contains("--- General ---"));
    }

    #[test]
    fn test_description_rendered_inline() {
        let prompt =
            build_extraction_prompt(&[field("Dose", Some("Intervention"), Some("in mg/day"))]);
        assert!(prompt.contains("- Dose: in mg/day\n"));
    }

    #[test]
    fn test_json_only_instruction_present() {
        let prompt = build_extraction_prompt(&[field("Year", None, None)]);
        assert!(prompt.contains("Return ONLY the JSON object"));
        assert!(prompt.starts_with("You are an expert scientific researcher."));
    }
}

//! Prompt catalog: one hand-authored template per task category.
//!
//! Every template ends with an output-format contract. Planning and clinical
//! synthesis ask for JSON (parsed downstream); the four analysis categories
//! ask for display-ready Markdown with fixed headings, so a JSON parse
//! failure on those is the expected outcome.

use super::genotypes;
use super::types::{ResearchMode, TaskCategory, TaskInput};
use crate::inference::config::TaskStrategy;

const ROLE_PREAMBLE: &str = "Eres un investigador experto en nutrigenómica, genética molecular y \
nutrición clínica. Respondes en español, con rigor científico y citando evidencia verificable.";

/// Render the full prompt for a task.
pub fn build_prompt(category: TaskCategory, input: &TaskInput, strategy: &TaskStrategy) -> String {
    let body = match category {
        TaskCategory::Planning => planning_prompt(input),
        TaskCategory::GeneticAnalysis => genetic_prompt(input),
        TaskCategory::MetabolicResearch => metabolic_prompt(input),
        TaskCategory::EpigeneticStudy => epigenetic_prompt(input),
        TaskCategory::LiteratureReview => literature_prompt(input),
        TaskCategory::ClinicalSynthesis => synthesis_prompt(input),
    };

    let mut prompt = String::with_capacity(body.len() + 512);
    prompt.push_str(ROLE_PREAMBLE);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Profundidad de investigación requerida: {}.\n\n",
        strategy.research_depth
    ));
    if let Some(block) = input.genotype_id.and_then(genotypes::context_block) {
        prompt.push_str(&block);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&body);
    prompt
}

fn aspect_of(input: &TaskInput) -> &str {
    input.aspect.as_deref().unwrap_or(input.query.as_str())
}

fn planning_prompt(input: &TaskInput) -> String {
    let mode = input.research_mode.unwrap_or_default();
    let approach = match mode {
        ResearchMode::DepthFirst => {
            "Enfoque en profundidad: descompón la consulta en aspectos que profundicen \
             progresivamente en el mecanismo central (genes, variantes, vías afectadas)."
        }
        ResearchMode::BreadthFirst => {
            "Enfoque en amplitud: descompón la consulta en aspectos independientes que cubran \
             dimensiones distintas (genética, metabolismo, epigenética, evidencia clínica)."
        }
    };
    format!(
        "TAREA: Planificar una investigación nutrigenómica.\n\n\
         CONSULTA: {query}\n\
         MODO: {mode}\n\n\
         {approach}\n\n\
         Usa nombres de aspecto descriptivos que incluyan el área \
         (por ejemplo \"Genética Molecular de ...\", \"Metabolismo de ...\", \
         \"Regulación Epigenética de ...\", \"Revisión de Literatura sobre ...\").\n\n\
         FORMATO DE SALIDA OBLIGATORIO:\n\
         Devuelve ÚNICAMENTE un arreglo JSON de 5 a 7 cadenas, cada una el nombre de un aspecto.\n\
         Sin texto adicional, sin explicaciones, sin bloques de código.\n\
         Ejemplo: [\"Genética Molecular del MTHFR\", \"Metabolismo del Folato\", \"Revisión de Literatura Clínica\"]",
        query = input.query,
        mode = mode.as_str(),
    )
}

fn genetic_prompt(input: &TaskInput) -> String {
    format!(
        "TAREA: Análisis genético del aspecto \"{aspect}\".\n\
         CONSULTA ORIGINAL: {query}\n\n\
         Analiza los genes, polimorfismos (SNPs) y variantes alélicas relevantes, su frecuencia, \
         su impacto funcional sobre enzimas o receptores y su interacción con nutrientes.\n\n\
         FORMATO DE SALIDA OBLIGATORIO (Markdown, NO JSON):\n\
         ## Análisis Genético Completo\n\
         Resumen del hallazgo principal.\n\
         ## Genes y Polimorfismos Analizados\n\
         Lista de genes con sus variantes (rsID cuando exista) e impacto funcional.\n\
         ## Interacciones Gen-Nutriente\n\
         Nutrientes afectados y mecanismo.\n\
         ## Implicaciones Clínicas\n\
         Consecuencias prácticas para la dieta y la suplementación.\n\
         ## Referencias\n\
         Estudios citados (autor, año, revista, PMID o DOI).",
        aspect = aspect_of(input),
        query = input.query,
    )
}

fn metabolic_prompt(input: &TaskInput) -> String {
    format!(
        "TAREA: Investigación metabólica del aspecto \"{aspect}\".\n\
         CONSULTA ORIGINAL: {query}\n\n\
         Describe las vías metabólicas implicadas, enzimas limitantes, cofactores, \
         metabolitos intermedios y biomarcadores medibles.\n\n\
         FORMATO DE SALIDA OBLIGATORIO (Markdown, NO JSON):\n\
         ## Análisis Metabólico Completo\n\
         Resumen del hallazgo principal.\n\
         ## Vías Metabólicas Implicadas\n\
         Vías, enzimas y cofactores.\n\
         ## Biomarcadores\n\
         Marcadores de laboratorio y valores de referencia.\n\
         ## Recomendaciones Nutricionales\n\
         Intervenciones dietéticas con su nivel de evidencia.\n\
         ## Referencias\n\
         Estudios citados (autor, año, revista, PMID o DOI).",
        aspect = aspect_of(input),
        query = input.query,
    )
}

fn epigenetic_prompt(input: &TaskInput) -> String {
    format!(
        "TAREA: Estudio epigenético del aspecto \"{aspect}\".\n\
         CONSULTA ORIGINAL: {query}\n\n\
         Analiza la metilación del ADN, modificaciones de histonas, microARNs y los factores \
         dietéticos y ambientales que modulan la expresión génica.\n\n\
         FORMATO DE SALIDA OBLIGATORIO (Markdown, NO JSON):\n\
         ## Análisis Epigenético Completo\n\
         Resumen del hallazgo principal.\n\
         ## Mecanismos Epigenéticos\n\
         Metilación, histonas y ARN no codificante.\n\
         ## Factores Moduladores\n\
         Nutrientes, hábitos y exposiciones con efecto demostrado.\n\
         ## Implicaciones Clínicas\n\
         Consecuencias prácticas.\n\
         ## Referencias\n\
         Estudios citados (autor, año, revista, PMID o DOI).",
        aspect = aspect_of(input),
        query = input.query,
    )
}

fn literature_prompt(input: &TaskInput) -> String {
    format!(
        "TAREA: Revisión de literatura científica sobre \"{aspect}\".\n\
         CONSULTA ORIGINAL: {query}\n\n\
         Prioriza metaanálisis, revisiones sistemáticas y ensayos clínicos aleatorizados. \
         Indica el tamaño muestral y las limitaciones de cada estudio.\n\n\
         FORMATO DE SALIDA OBLIGATORIO (Markdown, NO JSON):\n\
         ## Revisión de Literatura\n\
         Síntesis del estado actual del conocimiento.\n\
         ## Estudios Clave\n\
         Estudios relevantes con diseño, población y resultado principal.\n\
         ## Nivel de Evidencia\n\
         Valoración global de la calidad de la evidencia.\n\
         ## Referencias\n\
         Estudios citados (autor, año, revista, PMID o DOI).",
        aspect = aspect_of(input),
        query = input.query,
    )
}

fn synthesis_prompt(input: &TaskInput) -> String {
    let research_data =
        serde_json::to_string_pretty(&input.research_data).unwrap_or_else(|_| "[]".to_string());
    format!(
        "TAREA: Síntesis clínica integradora.\n\
         CONSULTA ORIGINAL: {query}\n\n\
         DATOS DE INVESTIGACIÓN (aspectos validados):\n{research_data}\n\n\
         Integra los hallazgos de todos los aspectos en un informe coherente, resolviendo \
         contradicciones y señalando el nivel de evidencia.\n\n\
         FORMATO DE SALIDA OBLIGATORIO:\n\
         Devuelve ÚNICAMENTE un objeto JSON válido con exactamente estas claves:\n\
         {{\n\
         \x20 \"summary\": [\"punto clave 1\", \"punto clave 2\"],\n\
         \x20 \"geneticProfile\": \"perfil genético integrado\",\n\
         \x20 \"metabolicAnalysis\": \"análisis metabólico integrado\",\n\
         \x20 \"epigeneticFactors\": \"factores epigenéticos relevantes\",\n\
         \x20 \"clinicalRecommendations\": [\"recomendación 1\", \"recomendación 2\"],\n\
         \x20 \"report\": \"informe completo en Markdown\",\n\
         \x20 \"confidenceScore\": 0.0\n\
         }}\n\
         Sin texto fuera del objeto JSON.",
        query = input.query,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::config::default_strategy;
    use crate::research::types::ResearchRecord;

    fn render(category: TaskCategory, input: &TaskInput) -> String {
        build_prompt(category, input, &default_strategy(category))
    }

    #[test]
    fn planning_demands_json_array() {
        let input = TaskInput::for_query("Investiga MTHFR C677T").with_mode(ResearchMode::BreadthFirst);
        let prompt = render(TaskCategory::Planning, &input);
        assert!(prompt.contains("arreglo JSON de 5 a 7 cadenas"));
        assert!(prompt.contains("Investiga MTHFR C677T"));
        assert!(prompt.contains("breadth-first"));
    }

    #[test]
    fn analysis_demands_markdown_headings() {
        let input = TaskInput::for_query("MTHFR").with_aspect("Genética Molecular");
        let prompt = render(TaskCategory::GeneticAnalysis, &input);
        assert!(prompt.contains("## Análisis Genético Completo"));
        assert!(prompt.contains("## Genes y Polimorfismos Analizados"));
        assert!(prompt.contains("## Referencias"));
        assert!(prompt.contains("\"Genética Molecular\""));
    }

    #[test]
    fn synthesis_demands_fixed_keys_and_embeds_data() {
        let input = TaskInput::for_query("MTHFR").with_research_data(vec![ResearchRecord {
            aspect: "Metabolismo del folato".into(),
            findings: "hallazgo".into(),
            confidence: 0.8,
        }]);
        let prompt = render(TaskCategory::ClinicalSynthesis, &input);
        for key in [
            "\"summary\"",
            "\"geneticProfile\"",
            "\"metabolicAnalysis\"",
            "\"epigeneticFactors\"",
            "\"clinicalRecommendations\"",
            "\"report\"",
            "\"confidenceScore\"",
        ] {
            assert!(prompt.contains(key), "missing {key}");
        }
        assert!(prompt.contains("Metabolismo del folato"));
    }

    #[test]
    fn genotype_block_only_when_known() {
        let with = TaskInput::for_query("q").with_genotype(Some(1));
        assert!(render(TaskCategory::MetabolicResearch, &with).contains("CONTEXTO GENOTÍPICO"));

        let unknown = TaskInput::for_query("q").with_genotype(Some(9));
        assert!(!render(TaskCategory::MetabolicResearch, &unknown).contains("CONTEXTO GENOTÍPICO"));

        let none = TaskInput::for_query("q");
        assert!(!render(TaskCategory::EpigeneticStudy, &none).contains("CONTEXTO GENOTÍPICO"));
    }

    #[test]
    fn depth_hint_comes_from_strategy() {
        let prompt = render(TaskCategory::LiteratureReview, &TaskInput::for_query("q"));
        assert!(prompt.contains("sistemática"));
    }
}

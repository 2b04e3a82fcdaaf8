//! Genotype reference table used to personalize prompts.
//!
//! Six genotypes, ids 1–6. Each carries a short list of recommended
//! superfoods and foods to avoid ("toxins"), rendered into a context block.

/// Static profile for one genotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenotypeProfile {
    pub id: u8,
    pub name: &'static str,
    pub superfoods: &'static [&'static str],
    pub toxins: &'static [&'static str],
}

const GENOTYPES: &[GenotypeProfile] = &[
    GenotypeProfile {
        id: 1,
        name: "Cazador",
        superfoods: &["carne roja magra", "hígado", "espinacas", "brócoli", "nueces"],
        toxins: &["trigo", "maíz", "lácteos de vaca", "azúcar refinado"],
    },
    GenotypeProfile {
        id: 2,
        name: "Recolector",
        superfoods: &["aves", "huevos", "aguacate", "arándanos", "almendras"],
        toxins: &["harinas refinadas", "carnes procesadas", "cacahuetes", "alcohol"],
    },
    GenotypeProfile {
        id: 3,
        name: "Maestro",
        superfoods: &["pescado azul", "legumbres", "soja fermentada", "té verde", "granada"],
        toxins: &["carne roja", "embutidos", "frituras", "edulcorantes artificiales"],
    },
    GenotypeProfile {
        id: 4,
        name: "Explorador",
        superfoods: &["cordero", "mariscos", "kale", "cúrcuma", "semillas de lino"],
        toxins: &["pollo", "maíz", "trigo sarraceno", "cafeína en exceso"],
    },
    GenotypeProfile {
        id: 5,
        name: "Guerrero",
        superfoods: &["salmón", "aceite de oliva", "tomate", "ajo", "frutos rojos"],
        toxins: &["carne de cerdo", "lácteos enteros", "patatas fritas", "azúcar"],
    },
    GenotypeProfile {
        id: 6,
        name: "Nómada",
        superfoods: &["carne de caza", "yogur fermentado", "avena", "uvas", "jengibre"],
        toxins: &["pollo", "maíz", "lentejas", "trigo"],
    },
];

/// Look up a genotype by id.
pub fn genotype(id: u8) -> Option<&'static GenotypeProfile> {
    GENOTYPES.iter().find(|g| g.id == id)
}

/// Every known genotype, ordered by id.
pub fn all() -> &'static [GenotypeProfile] {
    GENOTYPES
}

/// Prompt block describing the genotype, or `None` for an unknown id.
pub fn context_block(id: u8) -> Option<String> {
    let g = genotype(id)?;
    Some(format!(
        "CONTEXTO GENOTÍPICO:\n\
         - Genotipo {id}: {name}\n\
         - Superalimentos recomendados: {superfoods}\n\
         - Alimentos a evitar (toxinas): {toxins}\n\
         Integra este contexto en el análisis y en las recomendaciones.",
        id = g.id,
        name = g.name,
        superfoods = g.superfoods.join(", "),
        toxins = g.toxins.join(", "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_through_six() {
        let ids: Vec<u8> = all().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn context_block_lists_foods() {
        let block = context_block(3).unwrap();
        assert!(block.contains("Maestro"));
        assert!(block.contains("té verde"));
        assert!(block.contains("embutidos"));
    }

    #[test]
    fn unknown_genotype_has_no_block() {
        assert!(context_block(0).is_none());
        assert!(context_block(7).is_none());
    }
}

//! The fixed lab panel the risk model was trained on.
//!
//! Field order is the model's input order and the order of the value columns
//! in the `patients` table. Every consumer iterates [`FeatureField::ALL`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fields in the panel
pub const FEATURE_COUNT: usize = 16;

/// One measurement in the lab panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    AbsoluteBasophilCount,
    Ast,
    Bands,
    BaseExcess,
    CreatineKinase,
    Ferritin,
    L,
    Lipase,
    Mcv,
    Magnesium,
    Monocytes,
    Neutrophils,
    OxygenSaturation,
    PlateletCount,
    RedBloodCells,
    Po2,
}

impl FeatureField {
    /// All fields in model input order
    pub const ALL: [FeatureField; FEATURE_COUNT] = [
        FeatureField::AbsoluteBasophilCount,
        FeatureField::Ast,
        FeatureField::Bands,
        FeatureField::BaseExcess,
        FeatureField::CreatineKinase,
        FeatureField::Ferritin,
        FeatureField::L,
        FeatureField::Lipase,
        FeatureField::Mcv,
        FeatureField::Magnesium,
        FeatureField::Monocytes,
        FeatureField::Neutrophils,
        FeatureField::OxygenSaturation,
        FeatureField::PlateletCount,
        FeatureField::RedBloodCells,
        FeatureField::Po2,
    ];

    /// Position of this field in a feature vector
    pub fn position(self) -> usize {
        self as usize
    }

    /// Display name, also the feature name recorded in the model artifact
    pub fn name(self) -> &'static str {
        match self {
            Self::AbsoluteBasophilCount => "Absolute Basophil Count",
            Self::Ast => "Asparate Aminotransferase (AST)",
            Self::Bands => "Bands",
            Self::BaseExcess => "Base Excess",
            Self::CreatineKinase => "Creatine Kinase (CK)",
            Self::Ferritin => "Ferritin",
            Self::L => "L",
            Self::Lipase => "Lipase",
            Self::Mcv => "MCV",
            Self::Magnesium => "Magnesium",
            Self::Monocytes => "Monocytes",
            Self::Neutrophils => "Neutrophils",
            Self::OxygenSaturation => "Oxygen Saturation",
            Self::PlateletCount => "Platelet Count",
            Self::RedBloodCells => "Red Blood Cells",
            Self::Po2 => "pO2",
        }
    }

    /// Column name in the `patients` table
    pub fn column(self) -> &'static str {
        match self {
            Self::AbsoluteBasophilCount => "absolute_basophil_count",
            Self::Ast => "ast",
            Self::Bands => "bands",
            Self::BaseExcess => "base_excess",
            Self::CreatineKinase => "ck",
            Self::Ferritin => "ferritin",
            Self::L => "l",
            Self::Lipase => "lipase",
            Self::Mcv => "mcv",
            Self::Magnesium => "magnesium",
            Self::Monocytes => "monocytes",
            Self::Neutrophils => "neutrophils",
            Self::OxygenSaturation => "oxygen_saturation",
            Self::PlateletCount => "platelet_count",
            Self::RedBloodCells => "rbc",
            Self::Po2 => "po2",
        }
    }

    /// Look up a field by display name or column name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name || f.column() == name)
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a field given its display or column name
pub fn position_of(name: &str) -> Option<usize> {
    FeatureField::from_name(name).map(FeatureField::position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_follow_declaration_order() {
        for (i, field) in FeatureField::ALL.iter().enumerate() {
            assert_eq!(field.position(), i);
        }
    }

    #[test]
    fn test_names_and_columns_are_unique() {
        let mut names: Vec<_> = FeatureField::ALL.iter().map(|f| f.name()).collect();
        let mut columns: Vec<_> = FeatureField::ALL.iter().map(|f| f.column()).collect();
        names.sort_unstable();
        names.dedup();
        columns.sort_unstable();
        columns.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
        assert_eq!(columns.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_position_lookup() {
        assert_eq!(position_of("Absolute Basophil Count"), Some(0));
        assert_eq!(position_of("ck"), Some(4));
        assert_eq!(position_of("pO2"), Some(15));
        assert_eq!(position_of("rbc"), Some(14));
        assert_eq!(position_of("lactate"), None);
    }

    #[test]
    fn test_first_and_last_field() {
        assert_eq!(FeatureField::ALL[0], FeatureField::AbsoluteBasophilCount);
        assert_eq!(FeatureField::ALL[FEATURE_COUNT - 1], FeatureField::Po2);
        assert_eq!(FeatureField::Po2.to_string(), "pO2");
    }
}

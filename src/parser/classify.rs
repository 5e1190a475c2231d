use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "食育・栄養")]
    FoodNutrition,
    #[serde(rename = "健康・医療")]
    HealthMedical,
    #[serde(rename = "発達・育児相談")]
    DevelopmentConsultation,
    #[serde(rename = "父親・家族支援")]
    FatherFamily,
    #[serde(rename = "親子ふれあい")]
    ParentChildPlay,
    #[serde(rename = "ひとり親支援")]
    SingleParent,
    #[serde(rename = "産前・産後")]
    Perinatal,
    #[serde(rename = "生活支援")]
    LivingSupport,
    #[serde(rename = "その他")]
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::FoodNutrition,
        Category::HealthMedical,
        Category::DevelopmentConsultation,
        Category::FatherFamily,
        Category::ParentChildPlay,
        Category::SingleParent,
        Category::Perinatal,
        Category::LivingSupport,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::FoodNutrition => "食育・栄養",
            Category::HealthMedical => "健康・医療",
            Category::DevelopmentConsultation => "発達・育児相談",
            Category::FatherFamily => "父親・家族支援",
            Category::ParentChildPlay => "親子ふれあい",
            Category::SingleParent => "ひとり親支援",
            Category::Perinatal => "産前・産後",
            Category::LivingSupport => "生活支援",
            Category::Other => "その他",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == s.trim())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "妊娠中")]
    Pregnancy,
    #[serde(rename = "0歳")]
    Infant,
    #[serde(rename = "1〜2歳")]
    Toddler,
    #[serde(rename = "3〜5歳")]
    Preschool,
    #[serde(rename = "0歳〜未就学")]
    InfantToPreschool,
    #[serde(rename = "小学生以上")]
    SchoolAge,
    #[serde(rename = "指定なし")]
    Unspecified,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 7] = [
        AgeBucket::Pregnancy,
        AgeBucket::Infant,
        AgeBucket::Toddler,
        AgeBucket::Preschool,
        AgeBucket::InfantToPreschool,
        AgeBucket::SchoolAge,
        AgeBucket::Unspecified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AgeBucket::Pregnancy => "妊娠中",
            AgeBucket::Infant => "0歳",
            AgeBucket::Toddler => "1〜2歳",
            AgeBucket::Preschool => "3〜5歳",
            AgeBucket::InfantToPreschool => "0歳〜未就学",
            AgeBucket::SchoolAge => "小学生以上",
            AgeBucket::Unspecified => "指定なし",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.label() == s.trim())
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of a keyword-priority table: any keyword contained in the text
/// selects `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule<T> {
    pub keywords: Vec<String>,
    pub value: T,
}

impl<T> Rule<T> {
    fn new(keywords: &[&str], value: T) -> Self {
        Rule {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            value,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|k| !k.is_empty() && haystack.contains(k.as_str()))
    }
}

/// Ordered rule tables. Order is a first-match-wins tie-break, so narrower
/// phrases must come before the generic words they contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub categories: Vec<Rule<Category>>,
    pub ages: Vec<Rule<AgeBucket>>,
}

impl Default for RuleTable {
    fn default() -> Self {
        use AgeBucket as A;
        use Category as C;

        RuleTable {
            categories: vec![
                Rule::new(&["ひとり親"], C::SingleParent),
                Rule::new(&["パパ", "父親"], C::FatherFamily),
                Rule::new(&["離乳食", "食育", "栄養"], C::FoodNutrition),
                Rule::new(&["健康", "歯", "医療", "健診"], C::HealthMedical),
                Rule::new(&["発達", "相談", "育児"], C::DevelopmentConsultation),
                Rule::new(
                    &["ふれあい", "遊び", "リトミック", "マッサージ", "絵本", "体操"],
                    C::ParentChildPlay,
                ),
                Rule::new(
                    &["産前", "産後", "骨盤", "ヨガ", "ピラティス", "マタニティ"],
                    C::Perinatal,
                ),
                Rule::new(&["お金", "メイク", "カラー"], C::LivingSupport),
            ],
            ages: vec![
                Rule::new(&["妊婦", "妊娠中", "マタニティ"], A::Pregnancy),
                Rule::new(&["乳幼児"], A::InfantToPreschool),
                Rule::new(&["産後", "ベビー", "0歳", "乳児"], A::Infant),
                Rule::new(&["1歳", "2歳"], A::Toddler),
                Rule::new(&["3歳", "4歳", "5歳", "未就学", "幼児"], A::Preschool),
                Rule::new(&["小学"], A::SchoolAge),
            ],
        }
    }
}

impl RuleTable {
    /// Explicit hint naming a category wins; otherwise the first rule with a
    /// keyword in hint, title or body; otherwise `その他`.
    pub fn category(&self, title: &str, body: &str, hint: &str) -> Category {
        if let Some(c) = Category::from_label(hint) {
            return c;
        }
        let haystack = haystack(title, body, hint);
        first_match(&self.categories, &haystack).unwrap_or(Category::Other)
    }

    pub fn age(&self, title: &str, body: &str, hint: &str) -> AgeBucket {
        if let Some(a) = AgeBucket::from_label(hint) {
            return a;
        }
        let haystack = haystack(title, body, hint);
        first_match(&self.ages, &haystack).unwrap_or(AgeBucket::Unspecified)
    }
}

fn haystack(title: &str, body: &str, hint: &str) -> String {
    // Keywords are written half-width; fold full-width digits in the text.
    super::text::canonicalize(&format!("{hint}\n{title}\n{body}"))
}

fn first_match<T: Copy>(rules: &[Rule<T>], haystack: &str) -> Option<T> {
    rules.iter().find(|r| r.matches(haystack)).map(|r| r.value)
}

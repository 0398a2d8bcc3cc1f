/// ANSI color for a category name; unknown names get the default.
pub fn category_color(name: &str) -> &'static str {
    match name.trim().to_lowercase().as_str() {
        "laborales" => "34",
        "personales" => "35",
        "salud" => "32",
        "familiares" => "33",
        "aprendizaje" => "94",
        "hogar" => "95",
        "ocio" => "36",
        "financieras" => "31",
        _ => DEFAULT_COLOR,
    }
}

pub const DEFAULT_COLOR: &str = "90";

#[cfg(test)]
mod tests {
    use super::{DEFAULT_COLOR, category_color};

    #[test]
    fn lookup_is_total() {
        assert_eq!(category_color("Salud"), "32");
        assert_eq!(category_color("General"), DEFAULT_COLOR);
        assert_eq!(category_color(""), DEFAULT_COLOR);
    }
}

//! Typed encoder filter graphs.
//!
//! Graphs are built from chains of filters and rendered to the
//! `-filter_complex` string form:
//!
//! ```text
//! [0:v]scale=1920:1080[tmp];[1:a]adelay=200|200[audio0]
//! ```
//!
//! Option values are escaped for both parsing levels (filter options, then
//! graph syntax), so paths and text with `:` or `'` survive intact.

use std::fmt;

/// Format a number without trailing zeros (`5`, `1.5`, `0.333`).
pub fn fmt_num(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Escape a filter option value.
///
/// Plain tokens pass through; anything else is backslash-escaped for the
/// option parser and then single-quoted for the graph parser.
pub fn escape_value(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-+/#*|".contains(c));
    if plain {
        return raw.to_string();
    }
    let option_level = raw
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:");
    format!("'{}'", option_level.replace('\'', "'\\''"))
}

/// One filter with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Positional option.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push((None, value.into()));
        self
    }

    /// Named option.
    pub fn opt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((Some(key.into()), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = key {
                write!(f, "{key}=")?;
            }
            f.write_str(&escape_value(value))?;
        }
        Ok(())
    }
}

/// Labelled inputs, a comma-joined run of filters, labelled outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new(inputs: &[&str], filters: Vec<Filter>, output: &str) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            filters,
            outputs: vec![output.to_string()],
        }
    }

    pub fn single(inputs: &[&str], filter: Filter, output: &str) -> Self {
        Self::new(inputs, vec![filter], output)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for output in &self.outputs {
            write!(f, "[{output}]")?;
        }
        Ok(())
    }
}

/// A complete `-filter_complex` graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Every filter with the given name, in graph order.
    pub fn filters_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Filter> + 'a {
        self.chains
            .iter()
            .flat_map(|chain| chain.filters.iter())
            .filter(move |filter| filter.name == name)
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num_trims() {
        assert_eq!(fmt_num(5.0), "5");
        assert_eq!(fmt_num(1.5), "1.5");
        assert_eq!(fmt_num(1.0 / 3.0), "0.333");
        assert_eq!(fmt_num(-0.0001), "0");
        assert_eq!(fmt_num(f64::NAN), "0");
    }

    #[test]
    fn test_escape_plain_and_quoted() {
        assert_eq!(escape_value("200|200"), "200|200");
        assert_eq!(escape_value("between(t,1,2)"), "'between(t,1,2)'");
        assert_eq!(escape_value("a:b"), "'a\\:b'");
        assert_eq!(escape_value("it's"), "'it\\'\\''s'");
        assert_eq!(escape_value(""), "''");
    }

    #[test]
    fn test_chain_and_graph_rendering() {
        let mut graph = FilterGraph::new();
        graph.push(FilterChain::single(
            &["0:v"],
            Filter::new("scale").arg("1920").arg("1080"),
            "tmp",
        ));
        graph.push(FilterChain::new(
            &["1:v"],
            vec![
                Filter::new("format").arg("rgba"),
                Filter::new("colorchannelmixer").opt("aa", "0.5"),
            ],
            "v1",
        ));
        graph.push(FilterChain::single(&["0:v"], Filter::new("null"), "vout"));
        assert_eq!(
            graph.to_string(),
            "[0:v]scale=1920:1080[tmp];[1:v]format=rgba,colorchannelmixer=aa=0.5[v1];[0:v]null[vout]"
        );
        assert_eq!(graph.filters_named("format").count(), 1);
        assert_eq!(
            graph.filters_named("colorchannelmixer").next().unwrap().get("aa"),
            Some("0.5")
        );
    }
}

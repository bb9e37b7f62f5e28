//! Call-site matching: decides which invocations get traced.
//!
//! The tracker never inspects the host program; it only consumes a yes/no
//! decision per (function name, owner type) pair. Rules are configured once
//! before a session starts.

/// Decides whether an invocation should be traced.
pub trait CallMatcher {
    /// `owner` is the runtime type name of the owning instance, or `None`
    /// for a free function.
    fn should_trace(&self, func: &str, owner: Option<&str>) -> bool;
}

/// Trace every invocation. The default when no rules are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceAll;

impl CallMatcher for TraceAll {
    fn should_trace(&self, _func: &str, _owner: Option<&str>) -> bool {
        true
    }
}

/// One matching rule.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Glob-style pattern (`*`, `?`) matched against the function name.
    NamePattern(String),
    /// The owning instance's type name must be one of these.
    OwnerType(Vec<String>),
}

impl MatchRule {
    fn matches(&self, func: &str, owner: Option<&str>) -> bool {
        match self {
            Self::NamePattern(pattern) => glob_match(pattern, func),
            Self::OwnerType(types) => owner.is_some_and(|o| types.iter().any(|t| t == o)),
        }
    }
}

/// A set of rules; an invocation is traced when any rule matches.
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    rules: Vec<MatchRule>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl CallMatcher for MatchSet {
    fn should_trace(&self, func: &str, owner: Option<&str>) -> bool {
        self.rules.iter().any(|r| r.matches(func, owner))
    }
}

/// Match `name` against a glob pattern supporting `*` (any run) and `?`
/// (any single character).
fn glob_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = name.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(sp) = star {
            // Backtrack: let the last `*` swallow one more character.
            p = sp + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_basics() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("solve*", "solve_nonlinear"));
        assert!(glob_match("*_apply", "linearize_apply"));
        assert!(glob_match("s?lve", "solve"));
        assert!(!glob_match("solve", "solve_nonlinear"));
        assert!(!glob_match("s?lve", "slve"));
        assert!(glob_match("", ""));
        assert!(!glob_match("", "x"));
    }

    #[test]
    fn name_pattern_rule() {
        let set = MatchSet::new().with_rule(MatchRule::NamePattern("run*".into()));
        assert!(set.should_trace("run_model", None));
        assert!(!set.should_trace("setup", None));
    }

    #[test]
    fn owner_type_rule() {
        let set = MatchSet::new().with_rule(MatchRule::OwnerType(vec![
            "Solver".into(),
            "Driver".into(),
        ]));
        assert!(set.should_trace("anything", Some("Solver")));
        assert!(!set.should_trace("anything", Some("Component")));
        assert!(!set.should_trace("anything", None));
    }

    #[test]
    fn any_rule_suffices() {
        let set = MatchSet::new()
            .with_rule(MatchRule::NamePattern("solve*".into()))
            .with_rule(MatchRule::OwnerType(vec!["Driver".into()]));
        assert!(set.should_trace("solve", None));
        assert!(set.should_trace("step", Some("Driver")));
        assert!(!set.should_trace("step", Some("Solver")));
    }

    #[test]
    fn trace_all_matches_everything() {
        assert!(TraceAll.should_trace("f", None));
        assert!(TraceAll.should_trace("g", Some("T")));
    }

    #[test]
    fn empty_set_matches_nothing() {
        assert!(!MatchSet::new().should_trace("f", None));
    }
}

use crate::schema::{FillFn, StatGroup};

use super::{StatCalculator, StatContext};

/// Guarantees every field of a schema group exists on the emitted row.
/// Fields some other calculator already wrote are left alone.
pub struct ScaffoldCalculator {
    group: StatGroup,
    fill: FillFn,
    name: String,
}

impl ScaffoldCalculator {
    pub fn new(group: StatGroup, fill: FillFn) -> Self {
        let name = format!("scaffold:{}", group.name);
        Self { group, fill, name }
    }
}

impl StatCalculator for ScaffoldCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn finalize(&mut self, ctx: &mut StatContext) {
        for field in &self.group.fields {
            if !ctx.contains(field) {
                ctx.set(field, (self.fill)(&self.group, field));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScaffoldCalculator;
    use crate::schema::{StatGroup, declared_default_fill};
    use crate::stats::{StatContext, StatCalculator, TeamGame};
    use std::collections::BTreeMap;

    #[test]
    fn fills_only_missing_fields() {
        let group = StatGroup {
            name: "special_teams".into(),
            fields: vec!["st_punts".into(), "st_fg_pct".into()],
            defaults: BTreeMap::from([("st_fg_pct".to_string(), 0.8)]),
        };
        let mut calc = ScaffoldCalculator::new(group, declared_default_fill);
        let mut ctx = StatContext::new(2024, 1, TeamGame::new("g1", "ARI"), None, None);
        ctx.set("st_punts", 4.0);
        calc.finalize(&mut ctx);
        assert_eq!(ctx.get("st_punts"), 4.0);
        assert_eq!(ctx.get("st_fg_pct"), 0.8);
        assert_eq!(calc.name(), "scaffold:special_teams");
    }
}

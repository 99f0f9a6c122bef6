//! Plan assembly: extraction, registry lookups, and tag selection
//! across all matched files.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::{
    config::Config,
    extract::{ImageReference, extract_references},
    plan::{Plan, PlanEntry},
    registry::TagSource,
    tags::select_newer,
};

pub(crate) struct PlanBuilder<'run> {
    config: &'run Config,
    tags: &'run dyn TagSource,
    /// Successful selector results keyed by `(repository, current_tag)`.
    /// Reusing them is an optimization only; it cannot change the plan.
    /// Failed lookups are not cached and are retried per occurrence.
    resolved: IndexMap<(String, String), Option<String>>,
}

impl<'run> PlanBuilder<'run> {
    pub(crate) fn new(config: &'run Config, tags: &'run dyn TagSource) -> Self {
        Self {
            config,
            tags,
            resolved: IndexMap::new(),
        }
    }

    /// Builds the plan for `files`, in the given order. Unreadable
    /// files and failed lookups are logged and skipped; nothing here
    /// aborts the run.
    pub(crate) fn build(mut self, files: &[Utf8PathBuf]) -> Plan {
        let mut plan = Plan::new();
        for file in files {
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!("skipping {file}: {err}");
                    continue;
                }
            };
            self.scan(file, &text, &mut plan);
        }
        plan
    }

    /// Scans one file's text and appends any updates to `plan`, in line
    /// order.
    pub(crate) fn scan(&mut self, file: &Utf8Path, text: &str, plan: &mut Plan) {
        for reference in extract_references(file, text, self.config.patterns()) {
            let Some(new_tag) = self.resolve(&reference) else {
                continue;
            };

            let pattern = self
                .config
                .pattern(&reference.field)
                .expect("references only come from configured patterns");
            let Some(new_raw_value) = pattern.contract(&reference.repository, &new_tag) else {
                tracing::warn!(
                    "{file}:{line}: can't write `{new_tag}` back through template `{template}`",
                    line = reference.line,
                    template = pattern.template(),
                );
                continue;
            };

            plan.push(PlanEntry {
                reference,
                new_tag,
                new_raw_value,
            });
        }
    }

    fn resolve(&mut self, reference: &ImageReference) -> Option<String> {
        let key = (
            reference.repository.clone(),
            reference.current_tag.clone(),
        );
        if let Some(cached) = self.resolved.get(&key) {
            return cached.clone();
        }

        let tags = match self.tags.list_tags(&reference.repository) {
            Ok(tags) => tags,
            Err(err) => {
                tracing::warn!(
                    "skipping {repository}: {err}",
                    repository = reference.repository
                );
                return None;
            }
        };

        let selected = select_newer(&reference.current_tag, &tags);
        self.resolved.insert(key, selected.clone());
        selected
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use camino::Utf8Path;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{apply::rewrite, config::DEFAULT_FILE_MATCH, registry::LookupError};

    struct StubSource {
        tags: HashMap<&'static str, Vec<&'static str>>,
        calls: RefCell<Vec<String>>,
    }

    impl StubSource {
        fn new(tags: &[(&'static str, &[&'static str])]) -> Self {
            Self {
                tags: tags
                    .iter()
                    .map(|(repository, tags)| (*repository, tags.to_vec()))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl TagSource for StubSource {
        fn list_tags(&self, repository: &str) -> Result<Vec<String>, LookupError> {
            self.calls.borrow_mut().push(repository.to_string());
            match self.tags.get(repository) {
                Some(tags) => Ok(tags.iter().map(|tag| tag.to_string()).collect()),
                None => Err(LookupError::UnsupportedRegistry(repository.to_string())),
            }
        }
    }

    fn config() -> Config {
        Config::build(DEFAULT_FILE_MATCH, &IndexMap::new(), true).expect("valid config")
    }

    fn config_with(extra_fields: &[(&str, &str)]) -> Config {
        let extra_fields = extra_fields
            .iter()
            .map(|(field, template)| (field.to_string(), template.to_string()))
            .collect();
        Config::build(DEFAULT_FILE_MATCH, &extra_fields, true).expect("valid config")
    }

    #[test]
    fn entries_follow_file_then_line_order() {
        let config = config();
        let source = StubSource::new(&[("nginx", &["1.27.0"]), ("redis", &["7.4.1"])]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("a/docker-compose.yml"),
            "image: redis:7.2.4\nimage: nginx:1.25.3\n",
            &mut plan,
        );
        builder.scan(
            Utf8Path::new("b/docker-compose.yml"),
            "image: nginx:1.25.3\n",
            &mut plan,
        );

        let order: Vec<_> = plan
            .entries()
            .iter()
            .map(|entry| {
                (
                    entry.reference.file.as_str(),
                    entry.reference.line,
                    entry.new_tag.as_str(),
                )
            })
            .collect();
        assert_eq!(
            order,
            [
                ("a/docker-compose.yml", 1, "7.4.1"),
                ("a/docker-compose.yml", 2, "1.27.0"),
                ("b/docker-compose.yml", 1, "1.27.0"),
            ]
        );
    }

    #[test]
    fn identical_lookups_are_deduplicated() {
        let config = config();
        let source = StubSource::new(&[("nginx", &["1.27.0"])]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("docker-compose.yml"),
            "image: nginx:1.25.3\nimage: nginx:1.25.3\n",
            &mut plan,
        );

        assert_eq!(plan.len(), 2);
        assert_eq!(source.calls(), ["nginx"]);
    }

    #[test]
    fn lookup_failures_skip_only_the_failing_reference() {
        let config = config();
        let source = StubSource::new(&[("redis", &["7.4.1"])]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("docker-compose.yml"),
            "image: ghost:9.9.9\nimage: redis:7.2.4\n",
            &mut plan,
        );

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.entries()[0].reference.repository, "redis");
    }

    #[test]
    fn empty_tag_lists_produce_no_entries() {
        let config = config();
        let source = StubSource::new(&[("nginx", &[])]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("docker-compose.yml"),
            "image: nginx:1.25.3\n",
            &mut plan,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn files_without_recognizable_fields_are_a_noop() {
        let config = config();
        let source = StubSource::new(&[]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("docker-compose.yml"),
            "services:\n  web:\n    ports:\n      - 8080:80\n",
            &mut plan,
        );

        assert!(plan.is_empty());
        assert!(source.calls().is_empty());
    }

    #[test]
    fn custom_fields_rewrite_only_the_captured_value() {
        let config = config_with(&[("portainer_version", "portainer/portainer-ce:?-alpine")]);
        let source = StubSource::new(&[("portainer/portainer-ce", &["2.22.0-alpine"])]);
        let mut builder = PlanBuilder::new(&config, &source);

        let mut plan = Plan::new();
        builder.scan(
            Utf8Path::new("docker-compose.yml"),
            "portainer_version: 2.21.0\n",
            &mut plan,
        );

        assert_eq!(plan.len(), 1);
        let entry = &plan.entries()[0];
        assert_eq!(entry.new_tag, "2.22.0-alpine");
        assert_eq!(entry.new_raw_value, "2.22.0");
        assert_eq!(entry.reference.raw_value, "2.21.0");
    }

    #[test]
    fn applying_the_plan_makes_a_rerun_empty() {
        let config = config();
        let source = StubSource::new(&[("nginx", &["1.27.0", "1.25.3"])]);
        let text = "services:\n  web:\n    image: nginx:1.25.3\n";

        let mut plan = Plan::new();
        PlanBuilder::new(&config, &source).scan(
            Utf8Path::new("docker-compose.yml"),
            text,
            &mut plan,
        );
        assert_eq!(plan.len(), 1);

        let groups = plan.by_file();
        let entries = groups
            .get(Utf8Path::new("docker-compose.yml"))
            .expect("entries exist");
        let updated = rewrite(text, entries).expect("rewrite succeeds");
        assert_eq!(updated, "services:\n  web:\n    image: nginx:1.27.0\n");

        let mut rerun = Plan::new();
        PlanBuilder::new(&config, &source).scan(
            Utf8Path::new("docker-compose.yml"),
            &updated,
            &mut rerun,
        );
        assert!(rerun.is_empty());
    }
}

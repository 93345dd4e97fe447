use crate::error::LaurelError;
use crate::font::FontResource;
use crate::render::{NameRenderer, PlacementSpec};
use crate::template::TemplatePage;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One named batch of certificates: a template and the recipients stamped
/// onto it. The name list arrives pre-extracted; sheet discovery is the
/// caller's concern.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub label: String,
    pub template: Vec<u8>,
    pub names: Vec<String>,
}

impl GroupSpec {
    pub fn new(
        label: impl Into<String>,
        template: Vec<u8>,
        names: Vec<String>,
    ) -> Self {
        Self {
            label: label.into(),
            template,
            names,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Vec<u8>),
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub group: String,
    pub name: String,
    pub outcome: Outcome,
}

/// Every input name maps to exactly one entry, in input order. Immutable
/// once the batch run returns it.
#[derive(Debug, Default)]
pub struct BatchResult {
    entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub(crate) fn from_entries(entries: Vec<BatchEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Render names within a group on the rayon pool. Safe because each
    /// render works on its own surface copy; ordering is kept by index.
    pub parallel: bool,
    /// Checked between names; names not yet started when the token flips are
    /// simply absent from the result, not recorded as failures.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl BatchOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|token| token.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Drive the whole batch. No error escapes per item or per group: template
/// failures fail that group's names, render failures fail one name, and the
/// caller always gets one outcome per started input. The only `Err` returns
/// are caller mistakes (bad placement) and the distinct nothing-to-do case.
pub fn render_batch(
    groups: &[GroupSpec],
    placement: &PlacementSpec,
    font: &FontResource,
    renderer: &dyn NameRenderer,
    options: &BatchOptions,
) -> Result<BatchResult, LaurelError> {
    placement.validate()?;
    let total: usize = groups.iter().map(|g| g.names.len()).sum();
    if total == 0 {
        return Err(LaurelError::NothingToDo);
    }
    log::info!(
        "rendering batch: {} group(s), {} name(s)",
        groups.len(),
        total
    );

    let mut entries = Vec::with_capacity(total);
    'groups: for group in groups {
        if options.cancelled() {
            log::info!("batch cancelled before group {}", group.label);
            break;
        }
        let template = match TemplatePage::prepare(&group.template, placement.dpi) {
            Ok(template) => template,
            Err(err) => {
                log::warn!("group {} template rejected: {err}", group.label);
                let message = err.to_string();
                for name in &group.names {
                    entries.push(BatchEntry {
                        group: group.label.clone(),
                        name: name.clone(),
                        outcome: Outcome::Failure(message.clone()),
                    });
                }
                continue;
            }
        };
        log::debug!(
            "group {}: {}x{} pt at {} dpi, {} name(s)",
            group.label,
            template.geometry().width_pt,
            template.geometry().height_pt,
            placement.dpi,
            group.names.len()
        );

        if options.parallel {
            let rendered: Vec<Option<BatchEntry>> = group
                .names
                .par_iter()
                .map(|name| {
                    if options.cancelled() {
                        return None;
                    }
                    Some(render_one(group, name, &template, placement, font, renderer))
                })
                .collect();
            entries.extend(rendered.into_iter().flatten());
        } else {
            for name in &group.names {
                if options.cancelled() {
                    log::info!("batch cancelled inside group {}", group.label);
                    break 'groups;
                }
                entries.push(render_one(group, name, &template, placement, font, renderer));
            }
        }
    }

    let result = BatchResult::from_entries(entries);
    log::info!(
        "batch finished: {} ok, {} failed",
        result.success_count(),
        result.failure_count()
    );
    Ok(result)
}

fn render_one(
    group: &GroupSpec,
    raw_name: &str,
    template: &TemplatePage,
    placement: &PlacementSpec,
    font: &FontResource,
    renderer: &dyn NameRenderer,
) -> BatchEntry {
    let name = raw_name.trim();
    let outcome = if name.is_empty() {
        Outcome::Failure(LaurelError::EmptyName.to_string())
    } else {
        match renderer.render(template, name, placement, font) {
            Ok(bytes) => Outcome::Success(bytes),
            Err(err) => {
                log::warn!("render failed for {:?} in {}: {err}", raw_name, group.label);
                Outcome::Failure(err.to_string())
            }
        }
    };
    BatchEntry {
        group: group.label.clone(),
        name: raw_name.to_string(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::single_page_pdf;
    use crate::types::Cm;
    use std::sync::atomic::AtomicUsize;

    // Deterministic stand-in for a backend: succeeds with name-derived bytes,
    // fails on request, and counts invocations.
    struct StubRenderer {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl StubRenderer {
        fn new() -> Self {
            Self {
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(name: &'static str) -> Self {
            Self {
                fail_on: Some(name),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl NameRenderer for StubRenderer {
        fn render(
            &self,
            _template: &TemplatePage,
            name: &str,
            _placement: &PlacementSpec,
            _font: &FontResource,
        ) -> Result<Vec<u8>, LaurelError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_on == Some(name) {
                return Err(LaurelError::Render(format!("glyphs exploded for {name}")));
            }
            Ok(format!("pdf:{name}").into_bytes())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn every_input_name_yields_exactly_one_outcome() {
        let template = single_page_pdf("TPL");
        let groups = vec![
            GroupSpec::new("QUALIFIED", template.clone(), names(&["Alice", "Bob"])),
            GroupSpec::new("PARTICIPATED", template, names(&["Carol", "", "Dave"])),
        ];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect("batch");
        assert_eq!(result.len(), 5);
        assert_eq!(result.success_count(), 4);
        assert_eq!(result.failure_count(), 1);
    }

    #[test]
    fn output_order_matches_input_order() {
        let template = single_page_pdf("TPL");
        let groups = vec![GroupSpec::new(
            "QUALIFIED",
            template,
            names(&["Alice", "Bob", "Carol"]),
        )];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect("batch");
        let got: Vec<&str> = result.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(got, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn parallel_rendering_preserves_input_order() {
        let template = single_page_pdf("TPL");
        let many: Vec<String> = (0..24).map(|i| format!("Name {i}")).collect();
        let groups = vec![GroupSpec::new("QUALIFIED", template, many.clone())];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions {
                parallel: true,
                ..BatchOptions::default()
            },
        )
        .expect("batch");
        let got: Vec<&str> = result.entries().iter().map(|e| e.name.as_str()).collect();
        let want: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn unreadable_template_fails_its_group_but_not_siblings() {
        let groups = vec![
            GroupSpec::new(
                "SMART_EDGE",
                b"definitely not a pdf".to_vec(),
                names(&["Eve", "Frank"]),
            ),
            GroupSpec::new("QUALIFIED", single_page_pdf("TPL"), names(&["Alice"])),
        ];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect("batch");
        assert_eq!(result.len(), 3);
        for entry in &result.entries()[..2] {
            assert_eq!(entry.group, "SMART_EDGE");
            let message = entry.outcome.failure_message().expect("failure");
            assert!(message.contains("template unavailable"));
        }
        assert!(result.entries()[2].outcome.is_success());
    }

    #[test]
    fn empty_names_are_rejected_without_reaching_the_renderer() {
        let renderer = StubRenderer::new();
        let groups = vec![GroupSpec::new(
            "QUALIFIED",
            single_page_pdf("TPL"),
            names(&["   ", "Alice"]),
        )];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &renderer,
            &BatchOptions::default(),
        )
        .expect("batch");
        assert_eq!(result.len(), 2);
        let message = result.entries()[0].outcome.failure_message().expect("failure");
        assert!(message.contains("empty or whitespace-only name"));
        assert_eq!(renderer.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn one_bad_name_never_aborts_the_batch() {
        let renderer = StubRenderer::failing_on("Mallory");
        let groups = vec![GroupSpec::new(
            "QUALIFIED",
            single_page_pdf("TPL"),
            names(&["Alice", "Mallory", "Bob"]),
        )];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &renderer,
            &BatchOptions::default(),
        )
        .expect("batch");
        assert_eq!(result.len(), 3);
        assert!(result.entries()[0].outcome.is_success());
        let message = result.entries()[1].outcome.failure_message().expect("failure");
        assert!(message.contains("glyphs exploded"));
        assert!(result.entries()[2].outcome.is_success());
    }

    #[test]
    fn zero_input_items_is_a_distinct_nothing_to_do() {
        let err = render_batch(
            &[],
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect_err("empty batch");
        assert!(matches!(err, LaurelError::NothingToDo));

        let groups = vec![GroupSpec::new("QUALIFIED", single_page_pdf("TPL"), vec![])];
        let err = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect_err("no names");
        assert!(matches!(err, LaurelError::NothingToDo));
    }

    #[test]
    fn invalid_placement_is_rejected_up_front() {
        let mut placement = PlacementSpec::default();
        placement.max_width = Cm(-1.0);
        let groups = vec![GroupSpec::new(
            "QUALIFIED",
            single_page_pdf("TPL"),
            names(&["Alice"]),
        )];
        let err = render_batch(
            &groups,
            &placement,
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions::default(),
        )
        .expect_err("bad placement");
        assert!(matches!(err, LaurelError::InvalidPlacement(_)));
    }

    #[test]
    fn cancelled_batches_omit_unstarted_names() {
        let cancel = Arc::new(AtomicBool::new(true));
        let groups = vec![GroupSpec::new(
            "QUALIFIED",
            single_page_pdf("TPL"),
            names(&["Alice", "Bob"]),
        )];
        let result = render_batch(
            &groups,
            &PlacementSpec::default(),
            &FontResource::builtin(),
            &StubRenderer::new(),
            &BatchOptions {
                parallel: false,
                cancel: Some(cancel),
            },
        )
        .expect("cancelled batch still returns");
        assert!(result.is_empty());
    }
}

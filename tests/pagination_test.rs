use materialenlijst::error::PaginationError;
use materialenlijst::pagination::{
    CourseColumns, MeasureRow, OffscreenDocument, PageLayout, PaginationEngine, StyleProfile,
    SurfaceHost, SurfaceId, TextMetrics, ranges_from_breaks,
};

/// Every cell is `height` pixels tall, whatever it holds.
struct FixedHeight(f64);

impl MeasureRow for FixedHeight {
    fn measure_row(&self, _content: &str, _width: f64, _style: &StyleProfile) -> f64 {
        self.0
    }
}

/// Height grows with the number of explicit lines.
struct LineHeight(f64);

impl MeasureRow for LineHeight {
    fn measure_row(&self, content: &str, _width: f64, _style: &StyleProfile) -> f64 {
        content.split('\n').count() as f64 * self.0
    }
}

/// A host that never has room for a surface.
struct DetachedHost;

impl SurfaceHost for DetachedHost {
    fn attach(&mut self, _width_px: f64) -> Result<SurfaceId, PaginationError> {
        Err(PaginationError::AttachFailed("no document".to_string()))
    }

    fn detach(&mut self, _id: SurfaceId) {}
}

fn engine<M: MeasureRow>(measurer: M) -> PaginationEngine<M, OffscreenDocument> {
    PaginationEngine::new(measurer, OffscreenDocument::new(), PageLayout::default())
}

fn columns(rows: usize, count: usize) -> Vec<Vec<String>> {
    (0..count)
        .map(|c| (0..rows).map(|r| format!("r{}c{}", r, c)).collect())
        .collect()
}

#[test]
fn binary_search_keeps_safety_margin() {
    let mut engine = engine(FixedHeight(30.0));
    let rows = engine
        .compute_rows_per_page(&columns(50, 3), 900.0, true)
        .unwrap();
    // 28 * 30 = 840 <= 855 (95% of 900) < 29 * 30
    assert_eq!(rows, 28);
    assert_eq!(engine.host().attached_count(), 0, "probe surface must be detached");
    println!("✓ 50 rows of 30px on a 900px page give 28 rows per page");
}

#[test]
fn rows_per_page_edge_cases() {
    let mut engine = engine(FixedHeight(2000.0));
    assert_eq!(engine.compute_rows_per_page(&columns(0, 3), 900.0, true).unwrap(), 0);
    assert_eq!(
        engine.compute_rows_per_page(&columns(4, 3), 900.0, true).unwrap(),
        1,
        "an oversized row still gets its own page"
    );
    assert_eq!(
        engine.compute_rows_per_page(&columns(4, 3), 0.0, true),
        Err(PaginationError::InvalidBudget(0.0))
    );
    println!("✓ No rows gives 0, oversized rows give 1, bad budgets are errors");
}

#[test]
fn heaviest_row_drives_the_probe() {
    let mut data = columns(20, 2);
    data[1][7] = "a\nb\nc\nd".to_string();
    let mut engine = engine(LineHeight(10.0));
    // Every probe row is 40px: floor(95 / 40) = 2
    assert_eq!(engine.compute_rows_per_page(&data, 100.0, true).unwrap(), 2);
    println!("✓ The probe fills every row with the heaviest content");
}

#[test]
fn rows_per_page_grows_with_budget() {
    let data = columns(120, 3);
    let mut engine = engine(TextMetrics);
    let mut previous = 0;
    for budget in [200.0, 400.0, 800.0, 1200.0, 2400.0] {
        let rows = engine.compute_rows_per_page(&data, budget, true).unwrap();
        assert!(rows >= previous, "{} rows at {}px after {}", rows, budget, previous);
        previous = rows;
    }
    println!("✓ Rows per page is monotonic in the page budget");
}

#[test]
fn real_breaks_partition_rows() {
    let mut data = columns(40, 3);
    for r in (0..40).step_by(7) {
        data[2][r] = "lange\nlijst\nmet\nmaterialen".to_string();
    }
    let mut engine = engine(LineHeight(20.0));
    let breaks = engine.compute_real_page_breaks(&data, 300.0, true).unwrap();

    assert_eq!(*breaks.last().unwrap(), 40);
    assert!(breaks.windows(2).all(|w| w[0] < w[1]), "breaks must increase");
    let heights = engine.measure_row_heights(&data).unwrap();
    for range in ranges_from_breaks(&breaks) {
        let used: f64 = heights[range.clone()].iter().sum();
        assert!(used <= 300.0 || range.len() == 1, "page {:?} overflows", range);
    }
    assert_eq!(engine.host().attached_count(), 0);
    println!("✓ Real page breaks partition every row exactly once");
}

#[test]
fn title_only_shrinks_the_first_page() {
    let mut engine = engine(FixedHeight(30.0));
    let data = columns(50, 3);
    assert_eq!(engine.compute_real_page_breaks(&data, 900.0, true).unwrap(), vec![30, 50]);
    assert_eq!(
        engine
            .compute_real_page_breaks_with_title(&data, 900.0, true, 95.0)
            .unwrap(),
        vec![26, 50]
    );
    assert!(engine
        .compute_real_page_breaks(&columns(0, 3), 900.0, true)
        .unwrap()
        .is_empty());
    println!("✓ The report title only takes space on page one");
}

#[test]
fn attach_failure_is_reported() {
    let mut engine = PaginationEngine::new(FixedHeight(30.0), DetachedHost, PageLayout::default());
    assert!(matches!(
        engine.compute_real_page_breaks(&columns(5, 3), 900.0, true),
        Err(PaginationError::AttachFailed(_))
    ));
    assert!(matches!(
        engine.compute_rows_per_page(&columns(5, 3), 900.0, true),
        Err(PaginationError::AttachFailed(_))
    ));
    println!("✓ A failed attach surfaces as an error");
}

#[test]
fn courses_repeat_their_header() {
    let mut engine = engine(FixedHeight(30.0));
    let header = engine.course_header_height();
    assert!(header > 0.0);

    let courses = vec![
        CourseColumns {
            title: "Biologie".to_string(),
            columns: columns(50, 3),
        },
        CourseColumns {
            title: "Scheikunde".to_string(),
            columns: columns(5, 3),
        },
    ];
    let pages = engine.paginate_courses(&courses, 900.0, 0.0).unwrap();

    let per_page = ((900.0 - header) / 30.0).floor() as usize;
    assert_eq!(pages[0].rows, 0..per_page);
    assert!(pages.iter().all(|p| p.course_header));
    assert_eq!(pages.last().unwrap().course, 1);
    assert_eq!(pages.last().unwrap().rows, 0..5, "a new course starts a new page");

    let single = engine.paginate_courses(&courses[..1], 900.0, 0.0).unwrap();
    assert!(single.iter().all(|p| !p.course_header));
    assert_eq!(single[0].rows, 0..30);
    println!("✓ Multi-course pages carry a course header on every page");
}

#[test]
fn text_metrics_wrap_long_cells() {
    let style = StyleProfile::body();
    let narrow = TextMetrics.measure_row(&"woord ".repeat(60), 120.0, &style);
    let wide = TextMetrics.measure_row(&"woord ".repeat(60), 600.0, &style);
    let blank = TextMetrics.measure_row("", 120.0, &style);
    assert!(narrow > wide);
    assert!(wide > blank);
    assert_eq!(blank, TextMetrics.measure_row("x", 120.0, &style));
    println!("✓ Narrow columns wrap into taller rows");
}

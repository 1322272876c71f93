//! # Row-synchronized pagination
//!
//! Page breaks for the list report are decided from real row heights, not from
//! character counts. Content is laid out on an offscreen measurement surface
//! that mirrors the print structure (one container per column, one row element
//! per data row, fixed A4 width). Row heights are then synchronized across
//! columns: every row takes the tallest of its cells, which keeps the zebra
//! stripes aligned. The final render uses [`sync_row_heights`] as well, so the
//! breaks computed here match the printed pages.
//!
//! Two strategies are offered:
//!
//! 1. [`PaginationEngine::compute_rows_per_page`] probes a uniform row count by
//!    binary search, every row filled with the heaviest row's content, and
//!    keeps a 5% margin for font-metric variance.
//! 2. [`PaginationEngine::compute_real_page_breaks`] lays out everything once
//!    and accumulates real heights greedily. A row that does not fit starts
//!    the next page; rows are never split.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use unicode_width::UnicodeWidthStr;

use crate::error::PaginationError;

pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;
/// CSS pixels per millimetre at 96 dpi.
pub const PX_PER_MM: f64 = 96.0 / 25.4;
/// Share of the page budget a binary-search probe may fill.
pub const SAFETY_RATIO: f64 = 0.95;

pub fn mm_to_px(mm: f64) -> f64 {
    mm * PX_PER_MM
}

/// Typography of one kind of row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub font_size_px: f64,
    pub line_height: f64,
    pub padding_px: f64,
    /// Average glyph advance as a fraction of the font size.
    pub char_width_em: f64,
}

impl StyleProfile {
    pub fn body() -> Self {
        StyleProfile {
            font_size_px: 11.0,
            line_height: 1.35,
            padding_px: 4.0,
            char_width_em: 0.52,
        }
    }

    pub fn course_header() -> Self {
        StyleProfile {
            font_size_px: 15.0,
            line_height: 1.3,
            padding_px: 8.0,
            char_width_em: 0.55,
        }
    }

    pub fn title() -> Self {
        StyleProfile {
            font_size_px: 22.0,
            line_height: 1.25,
            padding_px: 10.0,
            char_width_em: 0.56,
        }
    }

    fn line_px(&self) -> f64 {
        self.font_size_px * self.line_height
    }
}

/// Physical page geometry of the print output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_mm: f64,
    pub column_gap_px: f64,
    pub body: StyleProfile,
    pub course_header: StyleProfile,
    pub title: StyleProfile,
}

impl Default for PageLayout {
    fn default() -> Self {
        PageLayout {
            page_width_mm: A4_WIDTH_MM,
            page_height_mm: A4_HEIGHT_MM,
            margin_mm: 15.0,
            column_gap_px: 8.0,
            body: StyleProfile::body(),
            course_header: StyleProfile::course_header(),
            title: StyleProfile::title(),
        }
    }
}

impl PageLayout {
    pub fn content_width_px(&self) -> f64 {
        mm_to_px(self.page_width_mm - 2.0 * self.margin_mm)
    }

    /// Printable height, the usual page budget.
    pub fn content_height_px(&self) -> f64 {
        mm_to_px(self.page_height_mm - 2.0 * self.margin_mm)
    }

    pub fn column_width_px(&self, columns: usize) -> f64 {
        let columns = columns.max(1) as f64;
        let gaps = self.column_gap_px * (columns - 1.0);
        ((self.content_width_px() - gaps) / columns).max(1.0)
    }
}

/// Height of one laid-out cell.
pub trait MeasureRow {
    fn measure_row(&self, content: &str, column_width_px: f64, style: &StyleProfile) -> f64;
}

/// Font-metrics measurer: greedy word wrap with a fixed average advance per
/// display cell. Explicit newlines start new lines; words wider than the
/// column break across lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMetrics;

impl TextMetrics {
    pub fn line_count(content: &str, column_width_px: f64, style: &StyleProfile) -> usize {
        let advance = (style.font_size_px * style.char_width_em).max(0.1);
        let capacity = (((column_width_px - 2.0 * style.padding_px) / advance).floor() as usize).max(1);

        content
            .split('\n')
            .map(|paragraph| wrapped_lines(paragraph, capacity))
            .sum::<usize>()
            .max(1)
    }
}

fn wrapped_lines(paragraph: &str, capacity: usize) -> usize {
    let mut lines = 1;
    let mut used = 0;
    for word in paragraph.split_whitespace() {
        let width = UnicodeWidthStr::width(word);
        if width > capacity {
            // Overlong word: finish the current line, then hard-break the word.
            if used > 0 {
                lines += 1;
            }
            lines += (width - 1) / capacity;
            used = width % capacity;
            if used == 0 {
                used = capacity;
            }
            continue;
        }
        let needed = if used == 0 { width } else { used + 1 + width };
        if needed <= capacity {
            used = needed;
        } else {
            lines += 1;
            used = width;
        }
    }
    lines
}

impl MeasureRow for TextMetrics {
    fn measure_row(&self, content: &str, column_width_px: f64, style: &StyleProfile) -> f64 {
        let lines = Self::line_count(content, column_width_px, style) as f64;
        lines * style.line_px() + 2.0 * style.padding_px
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

/// The document offscreen measurement surfaces are attached to.
pub trait SurfaceHost {
    fn attach(&mut self, width_px: f64) -> Result<SurfaceId, PaginationError>;
    fn detach(&mut self, id: SurfaceId);
}

/// In-process host; tracks which surfaces are attached.
#[derive(Debug, Default)]
pub struct OffscreenDocument {
    next_id: u64,
    attached: Vec<SurfaceId>,
}

impl OffscreenDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

impl SurfaceHost for OffscreenDocument {
    fn attach(&mut self, width_px: f64) -> Result<SurfaceId, PaginationError> {
        if !width_px.is_finite() || width_px <= 0.0 {
            return Err(PaginationError::AttachFailed(format!(
                "invalid surface width {}px",
                width_px
            )));
        }
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.attached.push(id);
        Ok(id)
    }

    fn detach(&mut self, id: SurfaceId) {
        self.attached.retain(|&a| a != id);
    }
}

/// Per-row height shared by all columns: the tallest cell of each row.
///
/// Used by the measurement pass and the final render alike.
pub fn sync_row_heights(column_heights: &[Vec<f64>]) -> Vec<f64> {
    let rows = column_heights.iter().map(Vec::len).max().unwrap_or(0);
    (0..rows)
        .map(|r| {
            column_heights
                .iter()
                .filter_map(|col| col.get(r).copied())
                .fold(0.0, f64::max)
        })
        .collect()
}

/// Index of the row whose longest cell is the longest of the dataset.
pub fn heaviest_row(columns: &[Vec<String>]) -> Option<usize> {
    let rows = row_count(columns);
    (0..rows)
        .map(|r| {
            let longest = columns
                .iter()
                .filter_map(|col| col.get(r))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            (r, longest)
        })
        // First row wins ties.
        .fold(None, |best: Option<(usize, usize)>, (r, len)| match best {
            Some((_, best_len)) if best_len >= len => best,
            _ => Some((r, len)),
        })
        .map(|(r, _)| r)
}

fn row_count(columns: &[Vec<String>]) -> usize {
    columns.iter().map(Vec::len).max().unwrap_or(0)
}

/// Laid-out rows of an attached surface. Detaches itself when dropped, however
/// the measurement ends.
struct MeasurementSurface<'h, H: SurfaceHost> {
    host: &'h mut H,
    id: SurfaceId,
    header_height: f64,
    /// Natural heights, `[column][row]`.
    natural: Vec<Vec<f64>>,
    synced: Vec<f64>,
    visible_rows: usize,
}

impl<'h, H: SurfaceHost> MeasurementSurface<'h, H> {
    fn attach(host: &'h mut H, width_px: f64) -> Result<Self, PaginationError> {
        let id = host.attach(width_px)?;
        Ok(MeasurementSurface {
            host,
            id,
            header_height: 0.0,
            natural: Vec::new(),
            synced: Vec::new(),
            visible_rows: 0,
        })
    }

    /// Lays out every cell and forces the row-height synchronization.
    fn render<M: MeasureRow>(
        &mut self,
        measurer: &M,
        columns: &[Vec<String>],
        column_width: f64,
        style: &StyleProfile,
    ) {
        let rows = row_count(columns);
        self.natural = columns
            .iter()
            .map(|col| {
                (0..rows)
                    .map(|r| {
                        let content = col.get(r).map(String::as_str).unwrap_or("");
                        measurer.measure_row(content, column_width, style)
                    })
                    .collect()
            })
            .collect();
        self.synced = sync_row_heights(&self.natural);
        self.visible_rows = rows;
    }

    fn show_rows(&mut self, count: usize) {
        self.visible_rows = count.min(self.synced.len());
    }

    fn content_height(&self) -> f64 {
        self.header_height + self.synced[..self.visible_rows].iter().sum::<f64>()
    }
}

impl<H: SurfaceHost> Drop for MeasurementSurface<'_, H> {
    fn drop(&mut self) {
        self.host.detach(self.id);
    }
}

/// One course's columns for multi-course pagination.
#[derive(Clone, Debug, PartialEq)]
pub struct CourseColumns {
    pub title: String,
    pub columns: Vec<Vec<String>>,
}

/// A printed page: a row range of one course.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageSlice {
    pub course: usize,
    pub rows: Range<usize>,
    /// Whether the course header is printed on this page.
    pub course_header: bool,
}

pub struct PaginationEngine<M: MeasureRow, H: SurfaceHost> {
    measurer: M,
    host: H,
    layout: PageLayout,
    course_header: String,
}

impl PaginationEngine<TextMetrics, OffscreenDocument> {
    pub fn with_text_metrics(layout: PageLayout) -> Self {
        PaginationEngine::new(TextMetrics, OffscreenDocument::new(), layout)
    }
}

impl<M: MeasureRow, H: SurfaceHost> PaginationEngine<M, H> {
    pub fn new(measurer: M, host: H, layout: PageLayout) -> Self {
        PaginationEngine {
            measurer,
            host,
            layout,
            course_header: "Cursus".to_string(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Text of the synthetic course header used in multi-course layouts.
    pub fn set_course_header(&mut self, title: &str) {
        self.course_header = title.to_string();
    }

    pub fn course_header_height(&self) -> f64 {
        self.measurer.measure_row(
            &self.course_header,
            self.layout.content_width_px(),
            &self.layout.course_header,
        )
    }

    pub fn title_height(&self, title: &str) -> f64 {
        self.measurer
            .measure_row(title, self.layout.content_width_px(), &self.layout.title)
    }

    fn header_height(&self, single_course: bool) -> f64 {
        if single_course {
            0.0
        } else {
            self.course_header_height()
        }
    }

    /// Largest uniform row count per page that stays within 95% of
    /// `budget_px`, probing with every row set to the heaviest row.
    ///
    /// Returns 0 for no rows and at least 1 otherwise, even when a single row
    /// is taller than the budget.
    pub fn compute_rows_per_page(
        &mut self,
        columns: &[Vec<String>],
        budget_px: f64,
        single_course: bool,
    ) -> Result<usize, PaginationError> {
        if !(budget_px > 0.0) {
            return Err(PaginationError::InvalidBudget(budget_px));
        }
        let total = row_count(columns);
        let Some(heaviest) = heaviest_row(columns) else {
            return Ok(0);
        };

        let probe: Vec<Vec<String>> = columns
            .iter()
            .map(|col| vec![col.get(heaviest).cloned().unwrap_or_default(); total])
            .collect();

        let column_width = self.layout.column_width_px(columns.len());
        let header_height = self.header_height(single_course);
        let limit = budget_px * SAFETY_RATIO;

        let mut surface = MeasurementSurface::attach(&mut self.host, self.layout.content_width_px())?;
        surface.header_height = header_height;
        surface.render(&self.measurer, &probe, column_width, &self.layout.body);

        let (mut lo, mut hi, mut best) = (1, total, 0);
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            surface.show_rows(mid);
            if surface.content_height() <= limit {
                best = mid;
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        drop(surface);

        if best == 0 {
            warn!(
                "heaviest row (#{}) does not fit a {:.0}px page; placing one row per page",
                heaviest, budget_px
            );
            best = 1;
        }
        debug!("rows per page: {} of {} (budget {:.0}px)", best, total, budget_px);
        Ok(best)
    }

    /// Exclusive end index of every page, from real synchronized row heights.
    /// The last entry equals the row count; no rows gives no pages.
    pub fn compute_real_page_breaks(
        &mut self,
        columns: &[Vec<String>],
        max_page_height_px: f64,
        single_course: bool,
    ) -> Result<Vec<usize>, PaginationError> {
        self.compute_real_page_breaks_with_title(columns, max_page_height_px, single_course, 0.0)
    }

    /// As [`Self::compute_real_page_breaks`], with `title_height_px` taken off
    /// the first page only.
    pub fn compute_real_page_breaks_with_title(
        &mut self,
        columns: &[Vec<String>],
        max_page_height_px: f64,
        single_course: bool,
        title_height_px: f64,
    ) -> Result<Vec<usize>, PaginationError> {
        if !(max_page_height_px > 0.0) {
            return Err(PaginationError::InvalidBudget(max_page_height_px));
        }
        let heights = self.measure_row_heights(columns)?;
        let header_height = self.header_height(single_course);
        let first_budget = max_page_height_px - header_height - title_height_px.max(0.0);
        let budget = max_page_height_px - header_height;

        let breaks = accumulate_breaks(&heights, first_budget, budget);
        debug!("page breaks: {:?}", breaks);
        Ok(breaks)
    }

    /// Synchronized heights of every row, as the final render lays them out.
    pub fn measure_row_heights(&mut self, columns: &[Vec<String>]) -> Result<Vec<f64>, PaginationError> {
        let column_width = self.layout.column_width_px(columns.len());
        let mut surface = MeasurementSurface::attach(&mut self.host, self.layout.content_width_px())?;
        surface.render(&self.measurer, columns, column_width, &self.layout.body);
        Ok(surface.synced.clone())
    }

    /// Pages for several courses. Each course starts on a new page and, when
    /// there is more than one course, repeats its header on every page; the
    /// report title only takes space on the very first page.
    pub fn paginate_courses(
        &mut self,
        courses: &[CourseColumns],
        max_page_height_px: f64,
        title_height_px: f64,
    ) -> Result<Vec<PageSlice>, PaginationError> {
        let single_course = courses.len() <= 1;
        let mut pages = Vec::new();

        for (index, course) in courses.iter().enumerate() {
            self.set_course_header(&course.title);
            let title = if index == 0 { title_height_px } else { 0.0 };
            let breaks = self.compute_real_page_breaks_with_title(
                &course.columns,
                max_page_height_px,
                single_course,
                title,
            )?;
            pages.extend(ranges_from_breaks(&breaks).into_iter().map(|rows| PageSlice {
                course: index,
                rows,
                course_header: !single_course,
            }));
        }
        Ok(pages)
    }
}

/// Greedy accumulation: a row that would overflow a non-empty page starts the
/// next one.
pub fn accumulate_breaks(heights: &[f64], first_budget: f64, budget: f64) -> Vec<usize> {
    let mut breaks = Vec::new();
    let mut running = 0.0;
    let mut rows_on_page = 0;
    let mut limit = first_budget;

    for (i, &h) in heights.iter().enumerate() {
        if rows_on_page >= 1 && running + h > limit {
            breaks.push(i);
            running = h;
            rows_on_page = 1;
            limit = budget;
        } else {
            running += h;
            rows_on_page += 1;
        }
    }
    if !heights.is_empty() {
        breaks.push(heights.len());
    }
    breaks
}

/// `[b1, b2, .., bn]` as `[0, b1), [b1, b2), .., [b(n-1), bn)`.
pub fn ranges_from_breaks(breaks: &[usize]) -> Vec<Range<usize>> {
    let mut start = 0;
    breaks
        .iter()
        .map(|&end| {
            let range = start..end;
            start = end;
            range
        })
        .collect()
}

//! The list-template export: a three column Blok / Week / Materials report
//! built from a hierarchy subtree and cut into A4 pages.

use chrono::Local;
use handlebars::Handlebars;
use log::info;
use serde::Serialize;

use crate::error::{ExportError, HierarchyError};
use crate::hierarchy::{HierarchyTree, NodeId};
use crate::pagination::{
    CourseColumns, MeasureRow, PaginationEngine, StyleProfile, SurfaceHost, ranges_from_breaks,
};

pub const REPORT_TITLE: &str = "Materialenlijst";

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="nl">
<head>
<meta charset="utf-8">
<meta name="generated" content="{{generated}}">
<title>{{title}}</title>
<style>
@page { size: A4; margin: {{margin_mm}}mm; }
body { margin: 0; font-family: Arial, Helvetica, sans-serif; }
.page { width: {{content_width}}px; page-break-after: always; }
.page:last-child { page-break-after: auto; }
.report-title, .course-header, .row { box-sizing: border-box; margin: 0; overflow: hidden; }
.report-title { font-size: {{title_style.font_size}}px; line-height: {{title_style.line_height}}; padding: {{title_style.padding}}px; }
.course-header { font-size: {{header_style.font_size}}px; line-height: {{header_style.line_height}}; padding: {{header_style.padding}}px; font-weight: bold; }
.columns { display: flex; gap: {{column_gap}}px; }
.column { flex: 1 1 0; min-width: 0; }
.row { font-size: {{body_style.font_size}}px; line-height: {{body_style.line_height}}; padding: {{body_style.padding}}px; white-space: pre-wrap; overflow-wrap: anywhere; }
.row.striped { background: #f2f2f2; }
</style>
</head>
<body>
{{#each pages}}
<section class="page">
{{#if show_title}}<h1 class="report-title" style="height: {{../title_height}}px">{{../title}}</h1>{{/if}}
{{#if course_header}}<div class="course-header" style="height: {{header_height}}px">{{course_title}}</div>{{/if}}
<div class="columns">
{{#each columns}}
<div class="column">
{{#each cells}}<div class="row{{#if striped}} striped{{/if}}" style="height: {{height}}px">{{text}}</div>
{{/each}}
</div>
{{/each}}
</div>
</section>
{{/each}}
</body>
</html>
"#;

/// One report line: a level-1 node with the materials below it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportRow {
    /// Only set on the first row of its block.
    pub blok: String,
    pub week: String,
    pub materials: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportCourse {
    pub title: String,
    pub rows: Vec<ReportRow>,
}

impl ReportCourse {
    /// The three print columns, row-aligned.
    pub fn columns(&self) -> Vec<Vec<String>> {
        vec![
            self.rows.iter().map(|r| r.blok.clone()).collect(),
            self.rows.iter().map(|r| r.week.clone()).collect(),
            self.rows.iter().map(|r| r.materials.clone()).collect(),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListReport {
    pub title: String,
    pub courses: Vec<ReportCourse>,
}

impl ListReport {
    /// Builds the report for the subtree at `node`.
    ///
    /// Below a level -2 root every child is a course; a level -1 node is a
    /// single course whose children are blocks; any deeper node is a single
    /// block. With `show_empty_cells` off, rows without materials are dropped.
    pub fn from_subtree(
        tree: &HierarchyTree,
        node: NodeId,
        show_empty_cells: bool,
    ) -> Result<Self, HierarchyError> {
        let start = tree.get(node)?;
        let course_nodes: Vec<(String, Vec<NodeId>)> = if start.level <= -2 {
            start
                .children
                .iter()
                .filter_map(|&c| tree.node(c))
                .map(|course| (course.value.clone(), course.children.clone()))
                .collect()
        } else if start.level == -1 {
            vec![(start.value.clone(), start.children.clone())]
        } else {
            vec![(String::new(), vec![node])]
        };

        let courses = course_nodes
            .into_iter()
            .map(|(title, bloks)| ReportCourse {
                title,
                rows: course_rows(tree, &bloks, show_empty_cells),
            })
            .collect();

        Ok(ListReport {
            title: REPORT_TITLE.to_string(),
            courses,
        })
    }

    pub fn row_count(&self) -> usize {
        self.courses.iter().map(|c| c.rows.len()).sum()
    }
}

fn course_rows(tree: &HierarchyTree, bloks: &[NodeId], show_empty_cells: bool) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for &blok in bloks {
        let Some(blok_node) = tree.node(blok) else {
            continue;
        };
        if blok_node.is_placeholder() {
            continue;
        }

        let mut block_rows: Vec<ReportRow> = blok_node
            .children
            .iter()
            .filter_map(|&week| tree.node(week))
            .map(|week| ReportRow {
                blok: String::new(),
                week: week.value.clone(),
                materials: leaf_values(tree, week.id).join("\n"),
            })
            .collect();
        if block_rows.is_empty() {
            block_rows.push(ReportRow {
                blok: String::new(),
                week: String::new(),
                materials: String::new(),
            });
        }
        if !show_empty_cells {
            block_rows.retain(|r| !r.materials.is_empty());
        }
        if let Some(first) = block_rows.first_mut() {
            first.blok = blok_node.value.clone();
        }
        rows.extend(block_rows);
    }
    rows
}

/// Non-blank values of the leaves below `id`, in pre-order.
fn leaf_values(tree: &HierarchyTree, id: NodeId) -> Vec<String> {
    tree.preorder_from(id)
        .into_iter()
        .skip(1)
        .filter_map(|n| tree.node(n))
        .filter(|n| n.children.is_empty() && !n.value.is_empty())
        .map(|n| n.value.clone())
        .collect()
}

#[derive(Serialize)]
struct CellContext {
    text: String,
    height: f64,
    striped: bool,
}

#[derive(Serialize)]
struct ColumnContext {
    cells: Vec<CellContext>,
}

#[derive(Serialize)]
struct PageContext {
    show_title: bool,
    course_header: bool,
    course_title: String,
    header_height: f64,
    columns: Vec<ColumnContext>,
}

/// CSS metrics of one `StyleProfile`, so the browser lays text out with the
/// numbers it was measured with.
#[derive(Serialize)]
struct StyleContext {
    font_size: f64,
    line_height: f64,
    padding: f64,
}

impl From<&StyleProfile> for StyleContext {
    fn from(style: &StyleProfile) -> Self {
        StyleContext {
            font_size: style.font_size_px,
            line_height: style.line_height,
            padding: style.padding_px,
        }
    }
}

#[derive(Serialize)]
struct DocumentContext {
    title: String,
    generated: String,
    margin_mm: f64,
    content_width: f64,
    title_height: f64,
    body_style: StyleContext,
    title_style: StyleContext,
    header_style: StyleContext,
    column_gap: f64,
    pages: Vec<PageContext>,
}

/// Print HTML for `report`, paginated on real row heights. Every row gets the
/// synchronized height the page breaks were computed with.
pub fn render_html<M: MeasureRow, H: SurfaceHost>(
    report: &ListReport,
    engine: &mut PaginationEngine<M, H>,
    max_page_height_px: f64,
) -> Result<String, ExportError> {
    let layout = engine.layout().clone();
    let title_height = engine.title_height(&report.title);
    let courses: Vec<CourseColumns> = report
        .courses
        .iter()
        .map(|c| CourseColumns {
            title: c.title.clone(),
            columns: c.columns(),
        })
        .collect();
    let single_course = courses.len() <= 1;

    let mut pages = Vec::new();
    for (index, course) in courses.iter().enumerate() {
        engine.set_course_header(&course.title);
        let header_height = engine.course_header_height();
        let heights = engine.measure_row_heights(&course.columns)?;
        let breaks = engine.compute_real_page_breaks_with_title(
            &course.columns,
            max_page_height_px,
            single_course,
            if index == 0 { title_height } else { 0.0 },
        )?;

        for rows in ranges_from_breaks(&breaks) {
            let columns = course
                .columns
                .iter()
                .map(|col| ColumnContext {
                    cells: rows
                        .clone()
                        .map(|r| CellContext {
                            text: col.get(r).cloned().unwrap_or_default(),
                            height: heights.get(r).copied().unwrap_or_default(),
                            striped: r % 2 == 1,
                        })
                        .collect(),
                })
                .collect();
            pages.push(PageContext {
                show_title: pages.is_empty(),
                course_header: !single_course,
                course_title: course.title.clone(),
                header_height,
                columns,
            });
        }
    }

    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", PAGE_TEMPLATE)
        .map_err(|e| ExportError::TemplateSyntax(Box::new(e)))?;

    let page_count = pages.len();
    let context = DocumentContext {
        title: report.title.clone(),
        generated: Local::now().format("%d-%m-%Y").to_string(),
        margin_mm: layout.margin_mm,
        content_width: layout.content_width_px(),
        title_height,
        body_style: StyleContext::from(&layout.body),
        title_style: StyleContext::from(&layout.title),
        header_style: StyleContext::from(&layout.course_header),
        column_gap: layout.column_gap_px,
        pages,
    };
    let html = handlebars.render("report", &context)?;
    info!(
        "rendered list report: {} row(s) on {} page(s)",
        report.row_count(),
        page_count
    );
    Ok(html)
}

//! Derived board state: counts, filtered views and progress figures.
//!
//! Every function here is pure. The current time is an explicit `now`
//! argument whose time zone defines the local calendar day.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};

use pace_proto::project::Project;
use pace_proto::status::TaskStatus;
use pace_proto::task::Task;

/// Headline counts for the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    /// Pending tasks normalized to `to-do`.
    pub to_do: usize,
    /// Pending tasks normalized to `in-progress`.
    pub in_progress: usize,
    /// Done tasks whose completion falls on today's local date.
    pub completed_today: usize,
}

/// The calendar date of `at` in `now`'s time zone.
fn local_date<Tz: TimeZone>(at: &DateTime<Utc>, now: &DateTime<Tz>) -> NaiveDate {
    at.with_timezone(&now.timezone()).date_naive()
}

/// Count to-do, in-progress and completed-today tasks.
///
/// Empty and unrecognized statuses count in neither pending bucket. A done
/// task without `completedAt` never counts as completed today.
pub fn task_counts<'a, Tz: TimeZone>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: &DateTime<Tz>,
) -> TaskCounts {
    let today = now.date_naive();
    let mut counts = TaskCounts::default();
    for task in tasks {
        match task.status.canonical() {
            Some(TaskStatus::ToDo) => counts.to_do += 1,
            Some(TaskStatus::InProgress) => counts.in_progress += 1,
            Some(TaskStatus::Done) => {
                if task.completed_at.is_some_and(|at| local_date(&at, now) == today) {
                    counts.completed_today += 1;
                }
            }
            None => {}
        }
    }
    counts
}

/// A named subset of the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskView {
    /// Everything not done, falling back to done tasks when nothing is
    /// pending.
    #[default]
    Pending,
    /// Pending tasks due today.
    DueToday,
    /// Pending tasks due within the window starting today.
    DueThisWeek,
    /// Pending tasks in progress.
    InProgress,
    /// Pending tasks due before today.
    Overdue,
}

impl TaskView {
    /// Parse a view key. Unknown keys select [`TaskView::Pending`].
    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key.trim().to_lowercase().as_str() {
            "due-today" | "today" => Self::DueToday,
            "due-this-week" | "week" => Self::DueThisWeek,
            "in-progress" | "inprogress" => Self::InProgress,
            "overdue" => Self::Overdue,
            _ => Self::Pending,
        }
    }

    /// The canonical view key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DueToday => "due-today",
            Self::DueThisWeek => "due-this-week",
            Self::InProgress => "in-progress",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for TaskView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Due date ascending, undated last, then id.
fn by_due_date(a: &Task, b: &Task) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Select and order the tasks shown by `view`.
///
/// `window_days` is the length of the due-this-week window.
pub fn filter_tasks<'a, Tz: TimeZone>(
    tasks: impl IntoIterator<Item = &'a Task>,
    view: TaskView,
    now: &DateTime<Tz>,
    window_days: u32,
) -> Vec<&'a Task> {
    let today = now.date_naive();
    let window_end = today
        .checked_add_days(Days::new(u64::from(window_days)))
        .unwrap_or(NaiveDate::MAX);
    let due_on = |task: &Task| task.due_date.map(|d| local_date(&d, now));

    let all: Vec<&Task> = tasks.into_iter().collect();
    let pending = all.iter().copied().filter(|t| t.status.is_pending());

    let mut selected: Vec<&Task> = match view {
        TaskView::Pending => {
            let pending: Vec<&Task> = pending.collect();
            if pending.is_empty() {
                all.iter().copied().filter(|t| t.is_done()).collect()
            } else {
                pending
            }
        }
        TaskView::DueToday => pending.filter(|t| due_on(*t) == Some(today)).collect(),
        TaskView::DueThisWeek => pending
            .filter(|t| due_on(*t).is_some_and(|d| d >= today && d < window_end))
            .collect(),
        TaskView::InProgress => pending
            .filter(|t| t.status.canonical() == Some(TaskStatus::InProgress))
            .collect(),
        TaskView::Overdue => pending
            .filter(|t| due_on(*t).is_some_and(|d| d < today))
            .collect(),
    };
    selected.sort_by(|a, b| by_due_date(a, b));
    selected
}

/// Count done tasks completed in the `days` days before `now`.
pub fn completed_within<'a, Tz: TimeZone>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: &DateTime<Tz>,
    days: u32,
) -> usize {
    let since = now.with_timezone(&Utc) - chrono::Duration::days(i64::from(days));
    tasks
        .into_iter()
        .filter(|t| t.is_done() && t.completed_at.is_some_and(|at| at >= since))
        .count()
}

/// Completions on one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    /// The local date.
    pub date: NaiveDate,
    /// Its weekday, for labelling.
    pub weekday: Weekday,
    /// Done tasks completed that day.
    pub completed: usize,
}

/// Completions per day for the last seven local dates, oldest first and
/// ending today.
pub fn weekly_progress<'a, Tz: TimeZone>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: &DateTime<Tz>,
) -> Vec<DayCount> {
    let today = now.date_naive();
    let mut days: Vec<DayCount> = (0..7u64)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|date| DayCount {
            date,
            weekday: date.weekday(),
            completed: 0,
        })
        .collect();
    for task in tasks.into_iter().filter(|t| t.is_done()) {
        let Some(at) = task.completed_at else {
            continue;
        };
        let date = local_date(&at, now);
        if let Some(day) = days.iter_mut().find(|d| d.date == date) {
            day.completed += 1;
        }
    }
    days
}

/// Progress of one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectProgress {
    /// Tasks in the project.
    pub total: u64,
    /// Done tasks in the project.
    pub done: u64,
    /// `done / total` as a rounded percentage, capped at 100.
    pub percent: u8,
    /// `false` if the figures were counted from visible tasks because the
    /// project has no stored counters yet.
    pub counted: bool,
}

/// Progress of `project`, preferring its stored counters and falling back
/// to counting the visible tasks that reference it.
pub fn project_progress<'a>(
    project: &Project,
    tasks: impl IntoIterator<Item = &'a Task>,
) -> ProjectProgress {
    let (visible_total, visible_done) = tasks
        .into_iter()
        .filter(|t| t.project_id.as_ref() == Some(&project.id))
        .fold((0u64, 0u64), |(total, done), t| {
            (total + 1, done + u64::from(t.is_done()))
        });
    let total = project.task_total.unwrap_or(visible_total);
    let done = project.task_done.unwrap_or(visible_done);
    ProjectProgress {
        total,
        done,
        percent: percent(done, total),
        counted: project.has_counters(),
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (done.saturating_mul(200) + total) / total.saturating_mul(2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

/// Everything the summary screen shows, computed in one pass over the
/// local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    /// The selected view.
    pub view: TaskView,
    /// Headline counts.
    pub counts: TaskCounts,
    /// Done tasks completed within the weekly window.
    pub completed_this_week: usize,
    /// Per-day completions for the last seven days.
    pub weekly: Vec<DayCount>,
    /// Visible projects with their progress, ordered by name.
    pub projects: Vec<(Project, ProjectProgress)>,
    /// The tasks in the selected view, in display order.
    pub tasks: Vec<Task>,
}

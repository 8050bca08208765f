//! Seed data: built-in rubrics so the service is demonstrable without an
//! external config file. Real deployments load their bank via
//! GRADER_CONFIG_PATH; these entries are never overwritten by it.

use crate::domain::Rubric;

/// Minimal set of built-in rubrics covering one exercise per book.
pub fn seed_rubrics() -> Vec<Rubric> {
  vec![
    Rubric {
      title: "Carey New Perspectives on HTML 5 and CSS: Comprehensive 8e".into(),
      chapter: "1".into(),
      exercise: "ex01".into(),
      prompt: "1. The document includes a comment with the student name and date [Possible Score: 1]\n\
               2. The page has a top-level heading matching the exercise text [Possible Score: 2]\n\
               3. All images carry alt text [Possible Score: 2]"
        .into(),
    },
    Rubric {
      title: "Minnick Responsive Web Design with HTML 5 and CSS, 9e".into(),
      chapter: "2".into(),
      exercise: "apply_your_knowledge".into(),
      prompt: "1. External stylesheet is linked from the document head [Possible Score: 1]\n\
               2. Stylesheet defines the required class selectors [Possible Score: 3]\n\
               3. No inline styles remain in the markup [Possible Score: 1]"
        .into(),
    },
  ]
}

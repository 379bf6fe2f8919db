mod common;

use std::path::PathBuf;
use std::sync::Arc;

use fweval_core::catalog::JUDGES_FILE;
use fweval_core::graders::{load_shared_judges, GraderContext};
use fweval_core::{discover, load_entries, select_evaluations, JudgeClient};

use common::StaticJudge;

fn evals_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../evals")
}

#[tokio::test]
async fn bundled_evaluations_load_and_grade() {
    let root = evals_root();
    let client: Arc<dyn JudgeClient> = Arc::new(StaticJudge { score: Some(0.0) });
    let judges = load_shared_judges(&root.join(JUDGES_FILE), client.clone()).unwrap();
    let ctx = GraderContext::new(client).with_shared_judges(judges);

    let all = discover(&root).unwrap();
    assert_eq!(all.len(), 32);
    let enabled = select_evaluations(all, &[]).unwrap();
    assert_eq!(enabled.len(), 31);
    assert!(enabled.iter().all(|e| e.path != "evals/billing/checkout-new"));

    let entries = load_entries(enabled, &ctx).unwrap();
    for entry in &entries {
        assert!(!entry.graders.is_empty(), "{}", entry.evaluation.path);
        // The judge says no, so at least one grader fails on an empty answer.
        let outcomes = entry.graders.grade("").await.unwrap();
        assert!(outcomes.iter().any(|o| !o.passed));
    }

    let auth = entries
        .iter()
        .find(|e| e.evaluation.path == "evals/auth/routes")
        .unwrap();
    assert_eq!(auth.evaluation.category, "Auth");
    assert_eq!(auth.evaluation.display_name(), "Protect API routes");

    let category = |path: &str| {
        entries
            .iter()
            .find(|e| e.evaluation.path == path)
            .map(|e| e.evaluation.category.clone())
            .unwrap()
    };
    assert_eq!(category("evals/000-basic-nextjs"), "Basic Nextjs");
    assert_eq!(category("evals/webhooks/users/sync"), "Webhooks");
    assert_eq!(category("evals/webhooks-billing"), "Webhooks");
    assert_eq!(category("evals/wallet-recovery"), "Openfort");
}

const BASIC_NEXTJS_ANSWER: &str = r#"
```json file="package.json"
{ "dependencies": { "@clerk/nextjs": "^6.9.0", "next": "15.1.0" } }
```

```ts file="middleware.ts"
import { clerkMiddleware } from '@clerk/nextjs/server'
export default clerkMiddleware()
```

```tsx file="app/layout.tsx"
import { ClerkProvider } from '@clerk/nextjs'
```
"#;

async fn load_one(path: &str, judge_score: f64) -> fweval_core::CatalogEntry {
    let root = evals_root();
    let client: Arc<dyn JudgeClient> = Arc::new(StaticJudge {
        score: Some(judge_score),
    });
    let judges = load_shared_judges(&root.join(JUDGES_FILE), client.clone()).unwrap();
    let ctx = GraderContext::new(client).with_shared_judges(judges);
    let selected = select_evaluations(discover(&root).unwrap(), &[path.to_string()]).unwrap();
    load_entries(selected, &ctx).unwrap().remove(0)
}

#[tokio::test]
async fn complete_answer_passes_every_basic_grader() {
    let entry = load_one("evals/000-basic-nextjs", 1.0).await;
    let outcomes = entry.graders.grade(BASIC_NEXTJS_ANSWER).await.unwrap();
    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|o| o.passed), "{outcomes:?}");
}

#[tokio::test]
async fn legacy_checks_compare_case_exactly() {
    let entry = load_one("evals/002-apiroutes", 1.0).await;
    let shouting = BASIC_NEXTJS_ANSWER.to_uppercase();
    let outcomes = entry.graders.grade(&shouting).await.unwrap();
    let import_function = outcomes.iter().find(|o| o.name == "import_function").unwrap();
    assert!(!import_function.passed);

    // The same needle is folded in the newer definition of this task.
    let entry = load_one("evals/auth/routes", 1.0).await;
    let outcomes = entry.graders.grade(&shouting).await.unwrap();
    let import_function = outcomes.iter().find(|o| o.name == "import_function").unwrap();
    assert!(import_function.passed);
}

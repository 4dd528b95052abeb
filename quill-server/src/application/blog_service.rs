use tracing::info;

use crate::application::normalizer::{normalize_categories, normalize_tags};
use crate::data::post_repository::{
    NewPost, Pagination, PostFilter, PostPatch, PostRepository, PostTransaction,
};
use crate::domain::error::DomainError;
use crate::domain::post::{CreatePostRequest, Post, UpdatePostRequest};
use crate::domain::taxonomy::{TagInput, Term, TermKind};

#[derive(Debug, Clone)]
pub(crate) struct ListPostsResult {
    pub(crate) posts: Vec<Post>,
    pub(crate) page: u32,
    pub(crate) page_size: u32,
    pub(crate) total: i64,
}

pub(crate) struct BlogService<R: PostRepository> {
    repo: R,
}

impl<R: PostRepository> BlogService<R> {
    pub(crate) fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Publishes a post. Term resolution, the post row, its links and the
    /// removal of the author's draft share one transaction.
    pub(crate) async fn create_post(
        &self,
        author_id: i64,
        req: CreatePostRequest,
    ) -> Result<Post, DomainError> {
        let req = req.validate()?;

        let mut tx = self.repo.begin().await?;
        let (tags, categories) = Self::resolve_terms(&mut tx, &req.tags, &req.categories).await?;
        let post_id = tx
            .insert_post(NewPost {
                title: req.title,
                content: req.content,
                author_id,
            })
            .await?;
        Self::link_terms(&mut tx, post_id, &tags, &categories).await?;
        tx.delete_draft(author_id).await?;
        tx.commit().await?;

        info!(
            post_id,
            author_id,
            tags = tags.len(),
            categories = categories.len(),
            "post published"
        );
        self.get_post(post_id).await
    }

    pub(crate) async fn get_post(&self, id: i64) -> Result<Post, DomainError> {
        self.repo
            .get_post(id)
            .await?
            .ok_or(DomainError::NotFound(format!("post id: {id}")))
    }

    pub(crate) async fn update_post(
        &self,
        actor_user_id: i64,
        post_id: i64,
        req: UpdatePostRequest,
    ) -> Result<Post, DomainError> {
        let req = req.validate()?;
        self.ensure_owner(actor_user_id, post_id).await?;

        let mut tx = self.repo.begin().await?;
        let patch = PostPatch {
            title: req.title,
            content: req.content,
        };
        if !tx.update_post(post_id, patch).await? {
            return Err(DomainError::NotFound(format!("post id: {post_id}")));
        }
        let (tags, categories) = Self::resolve_terms(&mut tx, &req.tags, &req.categories).await?;
        Self::link_terms(&mut tx, post_id, &tags, &categories).await?;
        tx.commit().await?;

        info!(
            post_id,
            tags = tags.len(),
            categories = categories.len(),
            "post updated"
        );
        self.get_post(post_id).await
    }

    pub(crate) async fn delete_post(
        &self,
        actor_user_id: i64,
        post_id: i64,
    ) -> Result<(), DomainError> {
        self.ensure_owner(actor_user_id, post_id).await?;

        let mut tx = self.repo.begin().await?;
        if !tx.delete_post(post_id).await? {
            return Err(DomainError::NotFound(format!("post id: {post_id}")));
        }
        tx.commit().await?;

        info!(post_id, "post deleted");
        Ok(())
    }

    pub(crate) async fn list_posts(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<ListPostsResult, DomainError> {
        self.list_filtered(PostFilter::All, page, page_size).await
    }

    /// Blank queries list everything.
    pub(crate) async fn search_posts(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ListPostsResult, DomainError> {
        let query = query.trim();
        let filter = if query.is_empty() {
            PostFilter::All
        } else {
            PostFilter::Search(query.to_string())
        };
        self.list_filtered(filter, page, page_size).await
    }

    pub(crate) async fn list_categories(&self) -> Result<Vec<Term>, DomainError> {
        self.repo.list_categories().await
    }

    pub(crate) async fn list_posts_by_category(
        &self,
        category_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Term, ListPostsResult), DomainError> {
        let category = self
            .repo
            .get_category(category_id)
            .await?
            .ok_or(DomainError::NotFound(format!("category id: {category_id}")))?;
        let result = self
            .list_filtered(PostFilter::Category(category_id), page, page_size)
            .await?;
        Ok((category, result))
    }

    async fn list_filtered(
        &self,
        filter: PostFilter,
        page: u32,
        page_size: u32,
    ) -> Result<ListPostsResult, DomainError> {
        let pagination = Pagination { page, page_size };
        let posts = self.repo.list_posts(&filter, pagination).await?;
        let total = self.repo.count_posts(&filter).await?;

        Ok(ListPostsResult {
            posts,
            page,
            page_size,
            total,
        })
    }

    async fn ensure_owner(&self, actor_user_id: i64, post_id: i64) -> Result<(), DomainError> {
        let post = self.get_post(post_id).await?;
        if post.author_id != actor_user_id {
            return Err(DomainError::Forbidden);
        }
        Ok(())
    }

    /// Resolves both term lists through `tx`, so new rows share its fate.
    async fn resolve_terms(
        tx: &mut R::Tx,
        tags: &TagInput,
        categories: &str,
    ) -> Result<(Vec<Term>, Vec<Term>), DomainError> {
        let tags = normalize_tags(&mut *tx.terms(TermKind::Tag), tags).await?;
        let categories =
            normalize_categories(&mut *tx.terms(TermKind::Category), categories).await?;
        Ok((tags, categories))
    }

    async fn link_terms(
        tx: &mut R::Tx,
        post_id: i64,
        tags: &[Term],
        categories: &[Term],
    ) -> Result<(), DomainError> {
        tx.set_post_terms(post_id, TermKind::Tag, tags).await?;
        tx.set_post_terms(post_id, TermKind::Category, categories)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::BlogService;
    use crate::data::post_repository::{
        NewPost, Pagination, PostFilter, PostPatch, PostRepository, PostTransaction,
    };
    use crate::data::repositories::sqlite::post_repository::SqlitePostRepository;
    use crate::data::repositories::sqlite::user_repository::SqliteUserRepository;
    use crate::data::term_repository::TermTable;
    use crate::data::user_repository::UserRepository;
    use crate::domain::error::DomainError;
    use crate::domain::post::{CreatePostRequest, Post, UpdatePostRequest};
    use crate::domain::taxonomy::{TagInput, Term, TermKind};
    use crate::infrastructure::database::{create_pool, run_migrations};

    #[derive(Debug, Clone, Default)]
    struct FakeState {
        posts: Vec<Post>,
        tags: Vec<Term>,
        categories: Vec<Term>,
        tag_links: HashMap<i64, Vec<Term>>,
        category_links: HashMap<i64, Vec<Term>>,
        draft_owners: Vec<i64>,
    }

    impl FakeState {
        fn table(&mut self, kind: TermKind) -> &mut Vec<Term> {
            match kind {
                TermKind::Tag => &mut self.tags,
                TermKind::Category => &mut self.categories,
            }
        }

        fn links(&mut self, kind: TermKind) -> &mut HashMap<i64, Vec<Term>> {
            match kind {
                TermKind::Tag => &mut self.tag_links,
                TermKind::Category => &mut self.category_links,
            }
        }

        fn hydrated(&self, post: &Post) -> Post {
            post.clone().with_terms(
                self.tag_links.get(&post.id).cloned().unwrap_or_default(),
                self.category_links
                    .get(&post.id)
                    .cloned()
                    .unwrap_or_default(),
            )
        }

        fn matches(&self, post: &Post, filter: &PostFilter) -> bool {
            match filter {
                PostFilter::All => true,
                PostFilter::Search(query) => {
                    let query = query.to_lowercase();
                    post.title.to_lowercase().contains(&query)
                        || post.content.to_lowercase().contains(&query)
                }
                PostFilter::Category(id) => self
                    .category_links
                    .get(&post.id)
                    .is_some_and(|terms| terms.iter().any(|term| term.id == *id)),
            }
        }
    }

    /// Transactions work on a snapshot that replaces the shared state on
    /// commit, so a dropped transaction leaves nothing behind.
    #[derive(Clone, Default)]
    struct FakePostRepo {
        state: Arc<Mutex<FakeState>>,
        fail_insert: Arc<Mutex<bool>>,
        begins: Arc<Mutex<usize>>,
        commits: Arc<Mutex<usize>>,
        last_filter: Arc<Mutex<Option<PostFilter>>>,
    }

    impl FakePostRepo {
        fn state(&self) -> FakeState {
            self.state.lock().expect("state mutex poisoned").clone()
        }

        fn seed_post(&self, author_id: i64, title: &str) -> i64 {
            let mut state = self.state.lock().expect("state mutex poisoned");
            let id = state.posts.len() as i64 + 1;
            state.posts.push(sample_post(id, title, author_id));
            id
        }

        fn seed_category(&self, name: &str) -> i64 {
            let mut state = self.state.lock().expect("state mutex poisoned");
            let id = state.categories.len() as i64 + 1;
            state.categories.push(Term {
                id,
                name: name.to_string(),
            });
            id
        }

        fn begins(&self) -> usize {
            *self.begins.lock().expect("begins mutex poisoned")
        }

        fn commits(&self) -> usize {
            *self.commits.lock().expect("commits mutex poisoned")
        }
    }

    struct FakeTx {
        shared: Arc<Mutex<FakeState>>,
        staged: FakeState,
        fail_insert: bool,
        commits: Arc<Mutex<usize>>,
    }

    struct FakeTerms<'a> {
        kind: TermKind,
        rows: &'a mut Vec<Term>,
    }

    #[async_trait]
    impl TermTable for FakeTerms<'_> {
        fn kind(&self) -> TermKind {
            self.kind
        }

        async fn find_by_name(&mut self, name: &str) -> Result<Option<Term>, DomainError> {
            Ok(self.rows.iter().find(|term| term.name == name).cloned())
        }

        async fn insert(&mut self, name: &str) -> Result<Term, DomainError> {
            let term = Term {
                id: self.rows.len() as i64 + 1,
                name: name.to_string(),
            };
            self.rows.push(term.clone());
            Ok(term)
        }
    }

    #[async_trait]
    impl PostTransaction for FakeTx {
        fn terms(&mut self, kind: TermKind) -> Box<dyn TermTable + '_> {
            Box::new(FakeTerms {
                kind,
                rows: self.staged.table(kind),
            })
        }

        async fn insert_post(&mut self, input: NewPost) -> Result<i64, DomainError> {
            if self.fail_insert {
                return Err(DomainError::Unexpected("insert failed".to_string()));
            }
            let id = self.staged.posts.len() as i64 + 1;
            let post = Post::new(
                id,
                input.title,
                input.content,
                input.author_id,
                Utc::now(),
                Utc::now(),
            )?;
            self.staged.posts.push(post);
            Ok(id)
        }

        async fn update_post(
            &mut self,
            post_id: i64,
            patch: PostPatch,
        ) -> Result<bool, DomainError> {
            match self.staged.posts.iter_mut().find(|post| post.id == post_id) {
                Some(post) => {
                    post.title = patch.title;
                    post.content = patch.content;
                    post.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete_post(&mut self, post_id: i64) -> Result<bool, DomainError> {
            let before = self.staged.posts.len();
            self.staged.posts.retain(|post| post.id != post_id);
            self.staged.tag_links.remove(&post_id);
            self.staged.category_links.remove(&post_id);
            Ok(self.staged.posts.len() < before)
        }

        async fn set_post_terms(
            &mut self,
            post_id: i64,
            kind: TermKind,
            terms: &[Term],
        ) -> Result<(), DomainError> {
            self.staged.links(kind).insert(post_id, terms.to_vec());
            Ok(())
        }

        async fn delete_draft(&mut self, user_id: i64) -> Result<(), DomainError> {
            self.staged.draft_owners.retain(|owner| *owner != user_id);
            Ok(())
        }

        async fn commit(self) -> Result<(), DomainError> {
            *self.shared.lock().expect("state mutex poisoned") = self.staged;
            *self.commits.lock().expect("commits mutex poisoned") += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepository for FakePostRepo {
        type Tx = FakeTx;

        async fn begin(&self) -> Result<FakeTx, DomainError> {
            *self.begins.lock().expect("begins mutex poisoned") += 1;
            Ok(FakeTx {
                shared: self.state.clone(),
                staged: self.state(),
                fail_insert: *self.fail_insert.lock().expect("fail_insert mutex poisoned"),
                commits: self.commits.clone(),
            })
        }

        async fn get_post(&self, id: i64) -> Result<Option<Post>, DomainError> {
            let state = self.state();
            Ok(state
                .posts
                .iter()
                .find(|post| post.id == id)
                .map(|post| state.hydrated(post)))
        }

        async fn list_posts(
            &self,
            filter: &PostFilter,
            pagination: Pagination,
        ) -> Result<Vec<Post>, DomainError> {
            *self.last_filter.lock().expect("last_filter mutex poisoned") = Some(filter.clone());
            let state = self.state();
            let skip = (pagination.page.saturating_sub(1) * pagination.page_size) as usize;
            Ok(state
                .posts
                .iter()
                .rev()
                .filter(|post| state.matches(post, filter))
                .skip(skip)
                .take(pagination.page_size as usize)
                .map(|post| state.hydrated(post))
                .collect())
        }

        async fn count_posts(&self, filter: &PostFilter) -> Result<i64, DomainError> {
            let state = self.state();
            Ok(state
                .posts
                .iter()
                .filter(|post| state.matches(post, filter))
                .count() as i64)
        }

        async fn list_categories(&self) -> Result<Vec<Term>, DomainError> {
            let mut categories = self.state().categories;
            categories.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(categories)
        }

        async fn get_category(&self, id: i64) -> Result<Option<Term>, DomainError> {
            Ok(self
                .state()
                .categories
                .into_iter()
                .find(|term| term.id == id))
        }
    }

    fn names(terms: &[Term]) -> Vec<&str> {
        terms.iter().map(|term| term.name.as_str()).collect()
    }

    fn create_request(tags: &str, categories: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: "  Hello  ".to_string(),
            content: "  # Body  ".to_string(),
            tags: TagInput::Text(tags.to_string()),
            categories: categories.to_string(),
        }
    }

    fn update_request(tags: &str, categories: &str) -> UpdatePostRequest {
        UpdatePostRequest {
            title: "Edited".to_string(),
            content: "new body".to_string(),
            tags: TagInput::Text(tags.to_string()),
            categories: categories.to_string(),
        }
    }

    #[tokio::test]
    async fn create_post_resolves_terms_and_clears_draft() {
        let repo = FakePostRepo::default();
        repo.state
            .lock()
            .expect("state mutex poisoned")
            .draft_owners
            .push(10);
        repo.state
            .lock()
            .expect("state mutex poisoned")
            .tags
            .push(Term {
                id: 1,
                name: "rust".to_string(),
            });
        let service = BlogService::new(repo.clone());

        let post = service
            .create_post(10, create_request("rust, new, rust", " Dev ,"))
            .await
            .expect("create_post must succeed");

        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "# Body");
        assert_eq!(post.author_id, 10);
        assert_eq!(names(&post.tags), vec!["rust", "new"]);
        assert_eq!(post.tags[0].id, 1);
        assert_eq!(names(&post.categories), vec!["Dev"]);

        let state = repo.state();
        assert_eq!(state.tags.len(), 2);
        assert!(state.draft_owners.is_empty());
        assert_eq!(repo.commits(), 1);
    }

    #[tokio::test]
    async fn failed_post_write_leaves_no_new_terms_and_keeps_draft() {
        let repo = FakePostRepo::default();
        repo.state
            .lock()
            .expect("state mutex poisoned")
            .draft_owners
            .push(10);
        *repo.fail_insert.lock().expect("fail_insert mutex poisoned") = true;
        let service = BlogService::new(repo.clone());

        let err = service
            .create_post(10, create_request("fresh", "Brand New"))
            .await
            .expect_err("create_post must fail");
        assert!(matches!(err, DomainError::Unexpected(_)));

        let state = repo.state();
        assert!(state.tags.is_empty());
        assert!(state.categories.is_empty());
        assert_eq!(state.draft_owners, vec![10]);
        assert_eq!(repo.commits(), 0);
    }

    #[tokio::test]
    async fn invalid_request_never_opens_a_transaction() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo.clone());

        let mut req = create_request("a", "");
        req.title = "   ".to_string();
        let err = service
            .create_post(10, req)
            .await
            .expect_err("must be rejected");

        assert!(matches!(err, DomainError::Validation { field: "title", .. }));
        assert_eq!(repo.begins(), 0);
    }

    #[tokio::test]
    async fn malformed_tag_json_is_a_validation_error() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo.clone());

        let err = service
            .create_post(10, create_request("[{\"value\": ", "Dev"))
            .await
            .expect_err("must be rejected");

        assert!(matches!(err, DomainError::Validation { field: "tags", .. }));
        let state = repo.state();
        assert!(state.posts.is_empty());
        assert!(state.categories.is_empty());
    }

    #[tokio::test]
    async fn get_post_returns_not_found_when_missing() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo);

        let err = service
            .get_post(42)
            .await
            .expect_err("post must be missing");
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_post_replaces_fields_and_terms_for_owner() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo.clone());
        let post = service
            .create_post(10, create_request("a, b", "One"))
            .await
            .expect("create_post must succeed");

        let updated = service
            .update_post(10, post.id, update_request("b, c", "Two, One"))
            .await
            .expect("update must succeed");

        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.author_id, 10);
        assert_eq!(names(&updated.tags), vec!["b", "c"]);
        assert_eq!(names(&updated.categories), vec!["Two", "One"]);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(repo.state().tags.len(), 3);
    }

    #[tokio::test]
    async fn update_by_non_owner_is_forbidden_and_changes_nothing() {
        let repo = FakePostRepo::default();
        let post_id = repo.seed_post(99, "theirs");
        let service = BlogService::new(repo.clone());

        let err = service
            .update_post(10, post_id, update_request("x", "y"))
            .await
            .expect_err("must be forbidden");

        assert!(matches!(err, DomainError::Forbidden));
        let state = repo.state();
        assert_eq!(state.posts[0].title, "theirs");
        assert!(state.tags.is_empty());
        assert_eq!(repo.begins(), 0);
    }

    #[tokio::test]
    async fn update_missing_post_is_not_found() {
        let service = BlogService::new(FakePostRepo::default());

        let err = service
            .update_post(10, 5, update_request("", ""))
            .await
            .expect_err("must be missing");
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_post_returns_forbidden_for_non_owner() {
        let repo = FakePostRepo::default();
        let post_id = repo.seed_post(99, "title");

        let service = BlogService::new(repo.clone());
        let err = service
            .delete_post(10, post_id)
            .await
            .expect_err("must be forbidden");
        assert!(matches!(err, DomainError::Forbidden));
        assert_eq!(repo.state().posts.len(), 1);
    }

    #[tokio::test]
    async fn delete_post_by_owner_removes_post_and_keeps_terms() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo.clone());
        let post = service
            .create_post(10, create_request("keep", "Kept"))
            .await
            .expect("create_post must succeed");

        service
            .delete_post(10, post.id)
            .await
            .expect("delete must succeed");

        let state = repo.state();
        assert!(state.posts.is_empty());
        assert!(state.tag_links.is_empty());
        assert_eq!(names(&state.tags), vec!["keep"]);
    }

    #[tokio::test]
    async fn list_posts_returns_newest_first_with_total() {
        let repo = FakePostRepo::default();
        for title in ["first", "second", "third"] {
            repo.seed_post(10, title);
        }

        let service = BlogService::new(repo);
        let result = service
            .list_posts(1, 2)
            .await
            .expect("list_posts must succeed");

        assert_eq!(result.page, 1);
        assert_eq!(result.page_size, 2);
        assert_eq!(result.total, 3);
        let titles: Vec<_> = result.posts.iter().map(|post| post.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn blank_search_lists_everything() {
        let repo = FakePostRepo::default();
        repo.seed_post(10, "Rust notes");
        repo.seed_post(10, "Gardening");
        let service = BlogService::new(repo.clone());

        let all = service
            .search_posts("   ", 1, 10)
            .await
            .expect("search must succeed");
        assert_eq!(all.total, 2);
        assert_eq!(
            *repo.last_filter.lock().expect("last_filter mutex poisoned"),
            Some(PostFilter::All)
        );

        let hits = service
            .search_posts(" rust ", 1, 10)
            .await
            .expect("search must succeed");
        assert_eq!(hits.total, 1);
        assert_eq!(
            *repo.last_filter.lock().expect("last_filter mutex poisoned"),
            Some(PostFilter::Search("rust".to_string()))
        );
    }

    #[tokio::test]
    async fn posts_by_category_requires_existing_category() {
        let repo = FakePostRepo::default();
        let service = BlogService::new(repo.clone());

        let err = service
            .list_posts_by_category(3, 1, 10)
            .await
            .expect_err("category must be missing");
        assert!(matches!(err, DomainError::NotFound(_)));

        service
            .create_post(10, create_request("", "Dev"))
            .await
            .expect("create_post must succeed");
        repo.seed_post(10, "uncategorized");

        let (category, result) = service
            .list_posts_by_category(1, 1, 10)
            .await
            .expect("listing must succeed");
        assert_eq!(category.name, "Dev");
        assert_eq!(result.total, 1);
        assert_eq!(result.posts[0].title, "Hello");
    }

    #[tokio::test]
    async fn categories_are_listed_by_name() {
        let repo = FakePostRepo::default();
        repo.seed_category("Zeta");
        repo.seed_category("Alpha");
        let service = BlogService::new(repo);

        let categories = service
            .list_categories()
            .await
            .expect("list_categories must succeed");
        assert_eq!(names(&categories), vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn concurrent_publishes_on_a_file_database_all_commit() {
        let dir = tempfile::tempdir().expect("temp dir must be created");
        let url = format!("sqlite:{}", dir.path().join("blog.db").display());
        let pool = create_pool(&url).await.expect("pool must open");
        run_migrations(&pool).await.expect("migrations must apply");
        let author_id = SqliteUserRepository::new(pool.clone())
            .upsert_user("admin", "hash")
            .await
            .expect("user must be created")
            .id;
        let service = Arc::new(BlogService::new(SqlitePostRepository::new(pool)));

        let mut tasks = Vec::new();
        for round in 0..5 {
            for _ in 0..8 {
                let service = Arc::clone(&service);
                tasks.push(tokio::spawn(async move {
                    service
                        .create_post(author_id, create_request(&format!("hot{round}, shared"), "news"))
                        .await
                }));
            }
        }
        for task in tasks {
            task.await
                .expect("task must not panic")
                .expect("every publish must commit");
        }

        let listed = service.list_posts(1, 100).await.expect("list must succeed");
        assert_eq!(listed.total, 40);
        let shared = service
            .search_posts("shared", 1, 100)
            .await
            .expect("search must succeed");
        assert_eq!(shared.total, 40);
        assert!(listed.posts.iter().all(|post| post.tags.len() == 2));
    }

    fn sample_post(id: i64, title: &str, author_id: i64) -> Post {
        Post::new(id, title, "body", author_id, Utc::now(), Utc::now())
            .expect("sample post must be valid")
    }
}

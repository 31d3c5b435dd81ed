use super::{
    Author, CreateAuthorParams, ParamSpec, Queries, ResultShape, TypedStatement,
    UpdateAuthorParams,
};
use crate::db::cancel::Cancel;
use crate::db::types::ColumnKind;
use crate::error::DbResult;

const ID: ParamSpec = ParamSpec {
    name: "id",
    kind: ColumnKind::Int8,
    nullable: false,
};
const NAME: ParamSpec = ParamSpec {
    name: "name",
    kind: ColumnKind::Text,
    nullable: false,
};
const BIO: ParamSpec = ParamSpec {
    name: "bio",
    kind: ColumnKind::Text,
    nullable: true,
};

pub(super) const CREATE_AUTHOR: TypedStatement = TypedStatement {
    name: "CreateAuthor",
    sql: "INSERT INTO author (name, bio) VALUES ($1, $2) RETURNING id, name, bio",
    params: &[NAME, BIO],
    result: ResultShape::One,
};

pub(super) const GET_AUTHOR: TypedStatement = TypedStatement {
    name: "GetAuthor",
    sql: "SELECT id, name, bio FROM author WHERE id = $1 LIMIT 1",
    params: &[ID],
    result: ResultShape::One,
};

pub(super) const LIST_AUTHORS: TypedStatement = TypedStatement {
    name: "ListAuthors",
    sql: "SELECT id, name, bio FROM author ORDER BY name",
    params: &[],
    result: ResultShape::Many,
};

pub(super) const UPDATE_AUTHOR: TypedStatement = TypedStatement {
    name: "UpdateAuthor",
    sql: "UPDATE author SET name = $2, bio = $3 WHERE id = $1",
    params: &[ID, NAME, BIO],
    result: ResultShape::Exec,
};

pub(super) const DELETE_AUTHOR: TypedStatement = TypedStatement {
    name: "DeleteAuthor",
    sql: "DELETE FROM author WHERE id = $1",
    params: &[ID],
    result: ResultShape::Exec,
};

pub(super) const CATALOG: &[TypedStatement] = &[
    CREATE_AUTHOR,
    GET_AUTHOR,
    LIST_AUTHORS,
    UPDATE_AUTHOR,
    DELETE_AUTHOR,
];

impl Queries {
    pub async fn create_author(
        &self,
        arg: &CreateAuthorParams,
        cancel: &Cancel,
    ) -> DbResult<Author> {
        let query = sqlx::query(CREATE_AUTHOR.sql)
            .bind(&arg.name)
            .bind(&arg.bio);
        self.query_one(&CREATE_AUTHOR, query, cancel).await
    }

    /// Fails with a cardinality error when no author has `id`.
    pub async fn get_author(&self, id: i64, cancel: &Cancel) -> DbResult<Author> {
        let query = sqlx::query(GET_AUTHOR.sql).bind(id);
        self.query_one(&GET_AUTHOR, query, cancel).await
    }

    pub async fn list_authors(&self, cancel: &Cancel) -> DbResult<Vec<Author>> {
        let query = sqlx::query(LIST_AUTHORS.sql);
        self.query_many(&LIST_AUTHORS, query, cancel).await
    }

    pub async fn update_author(&self, arg: &UpdateAuthorParams, cancel: &Cancel) -> DbResult<()> {
        let query = sqlx::query(UPDATE_AUTHOR.sql)
            .bind(arg.id)
            .bind(&arg.name)
            .bind(&arg.bio);
        self.exec(&UPDATE_AUTHOR, query, cancel).await.map(|_| ())
    }

    pub async fn delete_author(&self, id: i64, cancel: &Cancel) -> DbResult<()> {
        let query = sqlx::query(DELETE_AUTHOR.sql).bind(id);
        self.exec(&DELETE_AUTHOR, query, cancel).await.map(|_| ())
    }
}

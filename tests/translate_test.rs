//! Translation tests: joins, set operations, subqueries, recursion and read statements.

use pretty_assertions::assert_eq;
use qail_rdb::prelude::*;
use qail_rdb::parser;

fn catalog() -> EntityCatalog {
    EntityCatalog::new()
        .entity(
            "Order",
            EntityDef::new("orders")
                .key("id")
                .field("status")
                .column("total", "total_amount")
                .field("customer_id")
                .relation("Customer", &[("customer_id", "id")]),
        )
        .entity(
            "Customer",
            EntityDef::new("customers").key("id").field("name").field("region"),
        )
        .entity(
            "Item",
            EntityDef::new("items")
                .key("id")
                .column("order", "order_id")
                .field("qty")
                .relation("Order", &[("order", "id")]),
        )
        .entity(
            "Category",
            EntityDef::new("categories").key("id").field("parent_id").field("name"),
        )
        .entity("Tag", EntityDef::new("tags").field("label"))
}

fn translate(query: &Query) -> Translation {
    let catalog = catalog();
    QueryTranslator::new(&catalog, &MySqlFieldConverter)
        .translate(query, &mut TranslationContext::new())
        .unwrap()
}

fn select(query: &Query) -> Statement {
    let catalog = catalog();
    StatementBuilder::new(&catalog, &MySqlFieldConverter)
        .select(query, &mut TranslationContext::new())
        .unwrap()
}

fn busy_query() -> Query {
    Query::new("Order")
        .equal("status", "NEW")
        .or_filter("status", CriterionOperator::Equal, "OPEN")
        .filter_subquery(
            "id",
            CriterionOperator::In,
            Query::new("Item").select(&["order"]).greater_than("qty", 2).limit(10),
        )
        .join(JoinKind::Left, Query::new("Customer").equal("region", "EU"))
        .except(Query::new("Order").equal("status", "VOID"))
        .order_by_desc("total")
}

// ==================== Determinism and parameters ====================

#[test]
fn test_fresh_contexts_give_identical_sql() {
    let query = busy_query();
    let first = select(&query);
    let second = select(&query);
    assert_eq!(first, second);
}

#[test]
fn test_parameter_names_are_unique_and_bound() {
    let statement = select(&busy_query());
    let mut names = statement.parameters.names();
    let count = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), count);

    let mut referenced = parser::placeholders(&statement.text).unwrap();
    referenced.sort();
    referenced.dedup();
    assert_eq!(referenced, names);
}

#[test]
fn test_field_names_ending_in_digits_get_distinct_parameters() {
    let catalog = EntityCatalog::new().entity(
        "Reading",
        EntityDef::new("readings").field("a").field("a1").field("b"),
    );
    let mut query = Query::new("Reading").equal("a1", 100);
    for n in 0..9 {
        query = query.equal("b", n);
    }
    let query = query.equal("a", 200);

    let t = QueryTranslator::new(&catalog, &MySqlFieldConverter)
        .translate(&query, &mut TranslationContext::new())
        .unwrap();
    assert!(t.condition.starts_with("TB.`a1` = ?a11 AND TB.`b` = ?b2"));
    assert!(t.condition.ends_with("AND TB.`a` = ?a12"));

    let referenced = parser::placeholders(&t.condition).unwrap();
    assert_eq!(referenced.len(), 11);
    assert_eq!(t.parameters.len(), 11);
    assert_eq!(t.parameters.value("a11"), Some(&Value::Int(100)));
    assert_eq!(t.parameters.value("a12"), Some(&Value::Int(200)));
}

#[test]
fn test_translation_does_not_mutate_query() {
    let query = busy_query();
    let before = query.clone();
    let _ = translate(&query);
    assert_eq!(query, before);
}

// ==================== Join inference ====================

#[test]
fn test_explicit_join_fields_win() {
    let query = Query::new("Order").with_join(
        JoinEntry::new(JoinKind::Inner, Query::new("Customer")).on("status", "name"),
    );
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN `customers` AS S0 ON TB.`status` = S0.`name`"
    );
}

#[test]
fn test_self_join_uses_primary_keys() {
    let query = Query::new("Category").join(JoinKind::Inner, Query::new("Category"));
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN `categories` AS S0 ON TB.`id` = S0.`id`"
    );
}

#[test]
fn test_declared_relation_forward() {
    let query = Query::new("Order").join(JoinKind::Inner, Query::new("Customer"));
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN `customers` AS S0 ON TB.`customer_id` = S0.`id`"
    );
}

#[test]
fn test_declared_relation_reverse() {
    let query = Query::new("Order").join(JoinKind::Inner, Query::new("Item"));
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN `items` AS S0 ON TB.`id` = S0.`order_id`"
    );
}

#[test]
fn test_join_operator_is_applied() {
    let query = Query::new("Order").with_join(
        JoinEntry::new(JoinKind::Inner, Query::new("Item"))
            .on("id", "order")
            .operator(JoinOperator::GreaterThanOrEqual),
    );
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN `items` AS S0 ON TB.`id` >= S0.`order_id`"
    );
}

#[test]
fn test_join_condition_goes_to_on_clause() {
    let query = Query::new("Order")
        .equal("status", "NEW")
        .join(JoinKind::Left, Query::new("Customer").equal("region", "EU"));
    let t = translate(&query);
    assert_eq!(
        t.join_clause(),
        "LEFT JOIN `customers` AS S0 ON TB.`customer_id` = S0.`id` AND S0.`region` = ?region2"
    );
    assert_eq!(t.where_clause(), "WHERE TB.`status` = ?status1");
}

#[test]
fn test_cross_join_condition_goes_to_where() {
    let query = Query::new("Customer").join(JoinKind::Cross, Query::new("Tag").equal("label", "vip"));
    let t = translate(&query);
    assert_eq!(t.join_clause(), "CROSS JOIN `tags` AS S0");
    assert_eq!(t.where_clause(), "WHERE S0.`label` = ?label1");
}

#[test]
fn test_join_extra_goes_to_outer_where() {
    let query = Query::new("Order")
        .equal("status", "NEW")
        .or_filter("status", CriterionOperator::Equal, "OPEN")
        .with_join(
            JoinEntry::new(JoinKind::Left, Query::new("Customer"))
                .extra(Query::new("Customer").is_null("region")),
        );
    let t = translate(&query);
    assert_eq!(
        t.where_clause(),
        "WHERE (TB.`status` = ?status1 OR TB.`status` = ?status2) AND S0.`region` IS NULL"
    );
}

#[test]
fn test_join_without_entity_fails() {
    let catalog = catalog();
    let query = Query::new("Order").join(JoinKind::Inner, Query::default());
    let err = QueryTranslator::new(&catalog, &MySqlFieldConverter)
        .translate(&query, &mut TranslationContext::new())
        .unwrap_err();
    assert!(matches!(err, RdbError::MissingEntity("join")));
}

// ==================== Subqueries ====================

fn capped_items() -> Query {
    Query::new("Item")
        .select(&["order"])
        .greater_than("qty", 2)
        .order_by_desc("qty")
        .limit(5)
}

#[test]
fn test_capped_membership_subquery_is_doubly_nested() {
    let query = Query::new("Order").filter_subquery("id", CriterionOperator::In, capped_items());
    assert_eq!(
        translate(&query).condition,
        "TB.`id` IN (SELECT `order_id` FROM (SELECT S0.`order_id` FROM `items` AS S0 WHERE S0.`qty` > ?qty1 ORDER BY S0.`qty` DESC LIMIT 0,5) AS SS0)"
    );
}

#[test]
fn test_scalar_subquery_takes_one_row() {
    let query = Query::new("Order").filter_subquery("id", CriterionOperator::Equal, capped_items());
    assert_eq!(
        translate(&query).condition,
        "TB.`id` = (SELECT S0.`order_id` FROM `items` AS S0 WHERE S0.`qty` > ?qty1 ORDER BY S0.`qty` DESC LIMIT 0,1)"
    );
}

// ==================== Set operations ====================

#[test]
fn test_except_becomes_anti_join() {
    let query = Query::new("Order")
        .equal("status", "NEW")
        .except(Query::new("Order").equal("status", "VOID"));
    let statement = select(&query);
    assert_eq!(
        statement.text,
        "SELECT TB.`id`,TB.`status`,TB.`total_amount` AS `total`,TB.`customer_id` FROM `orders` AS TB \
         LEFT JOIN `orders` AS S0 ON TB.`id` = S0.`id` AND S0.`status` = ?status2 \
         WHERE TB.`status` = ?status1 AND S0.`id` IS NULL"
    );
    assert_eq!(query.joins.len(), 0);
    assert_eq!(query.combines.len(), 1);
}

#[test]
fn test_intersect_becomes_inner_join() {
    let query = Query::new("Order").intersect(Query::new("Order").select(&["customer_id"]));
    let t = translate(&query);
    assert_eq!(
        t.join_clause(),
        "INNER JOIN `orders` AS S0 ON TB.`customer_id` = S0.`customer_id`"
    );
    assert_eq!(t.condition, "");
}

#[test]
fn test_union_wraps_derived_table() {
    let query = Query::new("Order")
        .select(&["id", "status"])
        .equal("status", "NEW")
        .union(Query::new("Order").equal("status", "OPEN"))
        .order_by("id");
    assert_eq!(
        select(&query).text,
        "SELECT TB.`id`,TB.`status` FROM (SELECT TB.`id`,TB.`status` FROM `orders` AS TB WHERE TB.`status` = ?status1 \
         UNION SELECT S0.`id`,S0.`status` FROM `orders` AS S0 WHERE S0.`status` = ?status2) AS TB ORDER BY TB.`id` ASC"
    );
}

#[test]
fn test_join_on_union_is_wrapped() {
    let joined = Query::new("Customer")
        .select(&["id"])
        .equal("region", "EU")
        .union_all(Query::new("Customer").equal("region", "US"));
    let query = Query::new("Order").join(JoinKind::Inner, joined);
    assert_eq!(
        translate(&query).join_clause(),
        "INNER JOIN (SELECT S0.`id` FROM `customers` AS S0 WHERE S0.`region` = ?region1 \
         UNION ALL SELECT S1.`id` FROM `customers` AS S1 WHERE S1.`region` = ?region2) AS S2 \
         ON TB.`customer_id` = S2.`id`"
    );
}

// ==================== Recursion ====================

fn subtree() -> Query {
    Query::new("Category")
        .equal("name", "Tools")
        .recurve("id", "parent_id", RecurveDirection::Down)
}

#[test]
fn test_recurve_down_select() {
    assert_eq!(
        select(&subtree()).text,
        "WITH RECURSIVE RecurveTable0 AS (\
         SELECT TB.`id`,TB.`parent_id` FROM `categories` AS TB WHERE TB.`name` = ?name1 \
         UNION ALL \
         SELECT TB.`id`,TB.`parent_id` FROM `categories` AS TB JOIN `RecurveTable0` AS RTT0 ON TB.`parent_id`=RTT0.`id`) \
         SELECT TB.`id`,TB.`parent_id`,TB.`name` FROM `categories` AS TB \
         WHERE TB.`id` IN (SELECT RTT0.`id` FROM `RecurveTable0` AS RTT0)"
    );
}

#[test]
fn test_recurve_up_walks_to_parents() {
    let query = Query::new("Category")
        .equal("id", 9)
        .recurve("id", "parent_id", RecurveDirection::Up);
    let t = translate(&query);
    assert_eq!(t.with.len(), 1);
    assert!(t.with[0].ends_with("ON TB.`id`=RTT0.`parent_id`)"));
    assert!(!t.allow_join);
}

#[test]
fn test_recurve_folds_joins_into_anchor() {
    let query = Query::new("Category")
        .with_join(
            JoinEntry::new(JoinKind::Inner, Query::new("Category").equal("name", "Root"))
                .on("parent_id", "id"),
        )
        .recurve("id", "parent_id", RecurveDirection::Down);
    let t = translate(&query);
    assert_eq!(t.join_clause(), "");
    assert!(t.with[0].contains(
        "FROM `categories` AS TB INNER JOIN `categories` AS S0 ON TB.`parent_id` = S0.`id` AND S0.`name` = ?name1 UNION ALL"
    ));
}

#[test]
fn test_recursive_delete_runs_alone() {
    let catalog = catalog();
    let compiler = CommandCompiler::new(&catalog, &MySqlFieldConverter);
    let unit = compiler
        .compile(&Command::delete("Category").filter(subtree()), &mut TranslationContext::new())
        .unwrap();
    assert!(unit.has_pre_script);
    assert!(unit.perform_alone);
    assert!(unit.text().starts_with("WITH RECURSIVE RecurveTable0 AS ("));
    assert!(unit.text().ends_with(
        "DELETE TB FROM `categories` AS TB WHERE TB.`id` IN (SELECT RTT0.`id` FROM `RecurveTable0` AS RTT0);"
    ));
}

// ==================== Commands ====================

#[test]
fn test_update_end_to_end() {
    let catalog = EntityCatalog::new().entity(
        "Order",
        EntityDef::new("orders").key("id").field("status").field("total"),
    );
    let command = Command::update("Order")
        .set("status", "SHIPPED")
        .calculate("total", CalculateOperator::Add, 10.5)
        .filter(Query::new("Order").equal("id", 7));
    let unit = CommandCompiler::new(&catalog, &MySqlFieldConverter)
        .compile(&command, &mut TranslationContext::new())
        .unwrap();
    // SET and WHERE draw from one sequence, so no two names share a suffix
    // (`total2`, not a second `…1`).
    assert_eq!(
        unit.text(),
        "UPDATE `orders` AS TB SET TB.`status`=?status1, TB.`total`=TB.`total`+?total2 WHERE TB.`id` = ?id3;"
    );
    assert_eq!(
        unit.parameters,
        ParameterSet::new()
            .with("status1", "SHIPPED")
            .with("total2", 10.5)
            .with("id3", 7)
    );
}

#[test]
fn test_update_with_join_filter() {
    let catalog = catalog();
    let command = Command::update("Order")
        .set("status", "HELD")
        .filter(Query::new("Order").join(JoinKind::Inner, Query::new("Customer").equal("region", "EU")));
    let unit = CommandCompiler::new(&catalog, &MySqlFieldConverter)
        .compile(&command, &mut TranslationContext::new())
        .unwrap();
    assert_eq!(
        unit.text(),
        "UPDATE `orders` AS TB INNER JOIN `customers` AS S0 ON TB.`customer_id` = S0.`id` AND S0.`region` = ?region2 \
         SET TB.`status`=?status1;"
    );
}

// ==================== Read statements ====================

#[test]
fn test_text_query_passes_through() {
    let query = Query::text(
        "SELECT 1 FROM dual WHERE ?a = 1",
        ParameterSet::new().with("a", 1),
    );
    let statement = select(&query);
    assert_eq!(statement.text, "SELECT 1 FROM dual WHERE ?a = 1");
    assert_eq!(statement.parameters.names(), vec!["a"]);
}

#[test]
fn test_paging_after_recursive_prefix() {
    let catalog = catalog();
    let statement = StatementBuilder::new(&catalog, &MySqlFieldConverter)
        .offset(&subtree(), 10, 5, &mut TranslationContext::new())
        .unwrap();
    assert!(statement.text.starts_with("WITH RECURSIVE RecurveTable0 AS ("));
    assert!(statement.text.contains("),PagingTable AS (SELECT TB.`id`,TB.`parent_id`,TB.`name` FROM `categories` AS TB WHERE"));
    assert!(statement
        .text
        .ends_with("FROM PagingTable AS TB ORDER BY TB.`id` DESC LIMIT 10,5"));
}

#[test]
fn test_aggregate_over_union_wraps() {
    let catalog = catalog();
    let query = Query::new("Order")
        .select(&["total"])
        .equal("status", "NEW")
        .union(Query::new("Order").equal("status", "OPEN"));
    let statement = StatementBuilder::new(&catalog, &MySqlFieldConverter)
        .aggregate(AggregateFunction::Sum, &query, &mut TranslationContext::new())
        .unwrap();
    assert_eq!(
        statement.text,
        "SELECT SUM(TB.`total_amount`) FROM (SELECT TB.`id`,TB.`total_amount` FROM `orders` AS TB WHERE TB.`status` = ?status1 \
         UNION SELECT S0.`id`,S0.`total_amount` FROM `orders` AS S0 WHERE S0.`status` = ?status2) AS TB"
    );
}

#[test]
fn test_unknown_conversion_fails() {
    let catalog = catalog();
    let query = Query::new("Order").filter_converted(
        "status",
        FieldConversion::new("Soundex"),
        CriterionOperator::Equal,
        "x",
    );
    let err = StatementBuilder::new(&catalog, &MySqlFieldConverter)
        .select(&query, &mut TranslationContext::new())
        .unwrap_err();
    assert!(matches!(err, RdbError::UnknownConversion { ref name } if name == "Soundex"));
    assert!(err.is_configuration());
}

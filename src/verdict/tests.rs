use rstest::*;

use crate::verdict::{evaluate, evaluate_script, ScriptErrorKind, Statement, Tally, Verdict};

fn vote(client: &str, rank: u32) -> Statement {
    Statement::vote(client, rank)
}

#[rstest]
#[case::canonical(
    r#"if(!result.timeout){nodeRanks.push({client:"A",rank:42});}"#,
    vote("A", 42)
)]
#[case::trailing_semicolon(
    r#"if(!result.timeout){nodeRanks.push({client:"A",rank:42});};"#,
    vote("A", 42)
)]
#[case::round_opening_form(
    r#"if(!result.timeout){nodeRanks.push({client:"A",rank:7})};"#,
    vote("A", 7)
)]
#[case::spaced(
    r#"if (!result.timeout) { nodeRanks.push({client: "A", rank: 100}); }"#,
    vote("A", 100)
)]
#[case::uuid_client(
    r#"if(!result.timeout){nodeRanks.push({client:"0f5e6c1a-3a4b-4d2c-9a55-0d3c2b1a0f00",rank:1});}"#,
    vote("0f5e6c1a-3a4b-4d2c-9a55-0d3c2b1a0f00", 1)
)]
#[case::close_poll("result.timeout = true;", Statement::ClosePoll)]
#[case::close_poll_compact("result.timeout=true", Statement::ClosePoll)]
fn parse_statement(#[case] payload: &str, #[case] expected: Statement) {
    assert_eq!(Statement::parse(payload), Ok(expected));
}

#[test]
fn display_is_the_wire_form() {
    assert_eq!(
        vote("A", 42).to_string(),
        r#"if(!result.timeout){nodeRanks.push({client:"A",rank:42});}"#
    );
    assert_eq!(Statement::ClosePoll.to_string(), "result.timeout = true;");

    let parsed = Statement::parse(&vote("B", 77).to_string());
    assert_eq!(parsed, Ok(vote("B", 77)));
}

#[test]
fn parse_concatenated_script() {
    let script = concat!(
        r#"if(!result.timeout){nodeRanks.push({client:"A",rank:30});}"#,
        r#"if(!result.timeout){nodeRanks.push({client:"B",rank:77});}"#,
        "result.timeout = true;"
    );

    assert_eq!(
        Statement::parse_script(script),
        Ok(vec![vote("A", 30), vote("B", 77), Statement::ClosePoll])
    );
    assert_eq!(Statement::parse_script(""), Ok(vec![]));
}

#[test]
fn parse_errors() {
    let err = Statement::parse("ALIVE,A").unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::UnexpectedToken("A".to_string()));

    let err = Statement::parse(r#"if(!result.timeout){nodeRanks.push({client:"A",rank:"#)
        .unwrap_err();
    assert!(matches!(err.kind, ScriptErrorKind::BadRank(_)));

    let err = Statement::parse(r#"if(!result.timeout){nodeRanks.push({client:"A"#).unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::UnexpectedEnd);

    let err = Statement::parse("result.timeout = true;result.timeout = true;").unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StatementCount(2));

    let err = Statement::parse("").unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StatementCount(0));
}

#[test]
fn seed_verdict() {
    assert_eq!(Tally::new().verdict(), Verdict::default());
    assert_eq!(evaluate(&[]), Verdict::default());
}

#[test]
fn open_poll_has_no_consensus() {
    let verdict = evaluate(&[vote("A", 30), vote("B", 77)]);

    assert!(!verdict.consensus);
    assert_eq!(verdict.value, None);
    assert_eq!(verdict.first_candidate.as_deref(), Some("A"));
    assert!(verdict.is_first_candidate("A"));
    assert!(!verdict.is_first_candidate("B"));
}

#[test]
fn closed_poll_elects_highest_rank() {
    let verdict = evaluate(&[vote("A", 30), vote("B", 77), Statement::ClosePoll]);

    assert_eq!(
        verdict,
        Verdict {
            consensus: true,
            value: Some("B".to_string()),
            first_candidate: Some("A".to_string()),
            timeout: true,
        }
    );
}

#[rstest]
#[case::two_equal(vec![("A", 50), ("B", 50)], "A")]
#[case::equal_after_lower(vec![("A", 10), ("B", 60), ("C", 60)], "B")]
#[case::equal_max_at_end(vec![("A", 60), ("B", 10), ("C", 60)], "A")]
#[case::single(vec![("A", 1)], "A")]
fn ties_go_to_the_earliest_ballot(#[case] ballots: Vec<(&str, u32)>, #[case] leader: &str) {
    let mut prefix = ballots
        .into_iter()
        .map(|(client, rank)| vote(client, rank))
        .collect::<Vec<_>>();
    prefix.push(Statement::ClosePoll);

    assert_eq!(evaluate(&prefix).value.as_deref(), Some(leader));
}

#[test]
fn votes_after_close_poll_are_ignored() {
    let mut tally = Tally::new();
    tally.extend(&[vote("A", 10), Statement::ClosePoll, vote("B", 99)]);

    assert_eq!(tally.ballots().len(), 1);
    assert!(tally.is_closed());
    assert_eq!(tally.verdict().value.as_deref(), Some("A"));
}

#[test]
fn close_poll_without_ballots_has_no_leader() {
    let verdict = evaluate(&[Statement::ClosePoll]);

    assert!(verdict.consensus);
    assert_eq!(verdict.value, None);
    assert_eq!(verdict.first_candidate, None);
}

#[test]
fn consensus_is_monotone() {
    let log = vec![
        vote("A", 20),
        vote("B", 40),
        Statement::ClosePoll,
        vote("C", 90),
        Statement::ClosePoll,
        vote("D", 100),
    ];

    let mut tally = Tally::new();
    let mut reached = None;

    for statement in log.iter() {
        tally.apply(statement);
        let verdict = tally.verdict();

        if let Some(leader) = &reached {
            assert!(verdict.consensus);
            assert_eq!(&verdict.value, leader);
        } else if verdict.consensus {
            reached = Some(verdict.value);
        }
    }

    assert_eq!(reached, Some(Some("B".to_string())));
}

#[test]
fn incremental_fold_matches_full_evaluation() {
    let log = vec![
        vote("A", 33),
        vote("B", 12),
        vote("C", 33),
        vote("D", 34),
        Statement::ClosePoll,
        vote("E", 99),
    ];

    let mut tally = Tally::new();
    for (i, statement) in log.iter().enumerate() {
        tally.apply(statement);
        assert_eq!(tally.verdict(), evaluate(&log[..=i]));
    }
}

#[test]
fn script_evaluation_matches_statement_evaluation() {
    let statements = vec![vote("A", 30), vote("B", 77), Statement::ClosePoll];
    let script = statements
        .iter()
        .map(|statement| statement.to_string())
        .collect::<String>();

    assert_eq!(evaluate_script(&script), Ok(evaluate(&statements)));
}

#![warn(clippy::uninlined_format_args)]

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_till},
    character::complete::{alpha1, char, i64, multispace1, space1, u32, u64},
    combinator::{map_res, not, opt, recognize},
    multi::{many0, many1, separated_list1},
};

/// How an expense total is divided. Member ids are raw mention ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitSpec {
    Equal(Vec<u64>),
    Exact(Vec<(u64, i64)>),
    Shares(Vec<(u64, u32)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseLine {
    pub payer: u64,
    pub amount: i64,
    pub split: SplitSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Offset the n-th expense line of the script (1-based).
    Undo(usize),
    Balances,
    Simplify,
    SettleUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement<'a> {
    Group { id: u64, currency: &'a str },
    Member { id: u64, name: &'a str },
    Expense(ExpenseLine),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementWithLine<'a> {
    pub line: usize,
    pub statement: Statement<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script<'a> {
    pub statements: Vec<StatementWithLine<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error at line {line}: {detail}")]
    SyntaxError { line: usize, detail: String },
}

fn mention(input: &str) -> IResult<&str, u64> {
    let (input, _) = tag("<@")(input)?;
    let (input, _) = opt(char('!')).parse(input)?;
    let (input, id) = u64(input)?;
    let (input, _) = char('>')(input)?;
    Ok((input, id))
}

fn sp(input: &str) -> IResult<&str, &str> {
    fn line_comment(input: &str) -> IResult<&str, &str> {
        recognize((tag("//"), take_till(|c| c == '\n'))).parse(input)
    }

    recognize(many0(alt((multispace1, line_comment)))).parse(input)
}

// A single '/' belongs to the name; "//" starts a comment.
fn name_word(input: &str) -> IResult<&str, &str> {
    recognize(many1(alt((
        is_not(" \t\r\n/"),
        recognize((char('/'), not(char('/')))),
    ))))
    .parse(input)
}

fn display_name(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(space1, name_word)).parse(input)
}

// group 7 INR
fn group(input: &str) -> IResult<&str, Statement<'_>> {
    (tag_no_case("group"), sp, u64, sp, alpha1)
        .map(|(_, _, id, _, currency)| Statement::Group { id, currency })
        .parse(input)
}

// member <@1> Asha
fn member(input: &str) -> IResult<&str, Statement<'_>> {
    (tag_no_case("member"), sp, mention, sp, display_name)
        .map(|(_, _, id, _, name)| Statement::Member { id, name })
        .parse(input)
}

fn participant(input: &str) -> IResult<&str, (u64, Option<i64>)> {
    (mention, opt((char('='), i64)), sp)
        .map(|(id, share, _)| (id, share.map(|(_, amount)| amount)))
        .parse(input)
}

struct MixedShares;

fn split_from_participants(
    participants: Vec<(u64, Option<i64>)>,
) -> Result<SplitSpec, MixedShares> {
    if participants.iter().all(|(_, share)| share.is_none()) {
        return Ok(SplitSpec::Equal(
            participants.into_iter().map(|(id, _)| id).collect(),
        ));
    }
    participants
        .into_iter()
        .map(|(id, share)| share.map(|amount| (id, amount)).ok_or(MixedShares))
        .collect::<Result<Vec<_>, _>>()
        .map(SplitSpec::Exact)
}

// for <@1> <@2>  |  for <@1>=50 <@2>=100
fn for_clause(input: &str) -> IResult<&str, SplitSpec> {
    map_res(
        (tag_no_case("for"), sp, many1(participant)),
        |(_, _, participants)| split_from_participants(participants),
    )
    .parse(input)
}

// shares <@1>=1 <@2>=2
fn shares_clause(input: &str) -> IResult<&str, SplitSpec> {
    (
        tag_no_case("shares"),
        sp,
        many1((mention, char('='), u32, sp).map(|(id, _, weight, _)| (id, weight))),
    )
        .map(|(_, _, weights)| SplitSpec::Shares(weights))
        .parse(input)
}

// <@1> paid 300 for ...
fn expense(input: &str) -> IResult<&str, ExpenseLine> {
    (
        mention,
        sp,
        tag_no_case("paid"),
        sp,
        i64,
        sp,
        alt((shares_clause, for_clause)),
    )
        .map(|(payer, _, _, _, amount, _, split)| ExpenseLine {
            payer,
            amount,
            split,
        })
        .parse(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((
        (
            tag_no_case("!undo"),
            sp,
            map_res(u64, usize::try_from),
        )
            .map(|(_, _, n)| Command::Undo(n)),
        tag_no_case("!balances").map(|_| Command::Balances),
        tag_no_case("!simplify").map(|_| Command::Simplify),
        tag_no_case("!settleup").map(|_| Command::SettleUp),
    ))
    .parse(input)
}

fn statement(input: &str) -> IResult<&str, Statement<'_>> {
    alt((
        group,
        member,
        command.map(Statement::Command),
        expense.map(Statement::Expense),
    ))
    .parse(input)
}

fn statement_with_sp(input: &str) -> IResult<&str, Statement<'_>> {
    (sp, statement, sp).map(|(_, stmt, _)| stmt).parse(input)
}

fn syntax_error_detail(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Incomplete(_) => "incomplete input".to_owned(),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let near = e.input.trim();
            if near.is_empty() {
                "unexpected end of line".to_owned()
            } else {
                format!("unexpected input '{near}'")
            }
        }
    }
}

/// Parses a ledger script, one statement per line.
pub fn parse_script(input: &str) -> Result<Script<'_>, ParseError> {
    let mut statements = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let (rest, _) = sp(line).map_err(|e| ParseError::SyntaxError {
            line: line_no,
            detail: syntax_error_detail(e),
        })?;
        if rest.trim().is_empty() {
            continue;
        }
        match statement_with_sp(rest) {
            Ok((rest, statement)) => {
                if !rest.trim().is_empty() {
                    return Err(ParseError::SyntaxError {
                        line: line_no,
                        detail: format!("unparsed input '{}'", rest.trim()),
                    });
                }
                statements.push(StatementWithLine {
                    line: line_no,
                    statement,
                });
            }
            Err(e) => {
                return Err(ParseError::SyntaxError {
                    line: line_no,
                    detail: syntax_error_detail(e),
                });
            }
        }
    }

    Ok(Script { statements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse_one(input: &str) -> Statement<'_> {
        let script = parse_script(input).expect("script should parse");
        assert_eq!(script.statements.len(), 1);
        script.statements[0].statement.clone()
    }

    #[rstest]
    #[case::standard("<@123456789>", 123456789)]
    #[case::nickname("<@!42>", 42)]
    fn parses_mentions(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(mention(input).map(|(_, id)| id), Ok(expected));
    }

    #[rstest]
    #[case::group("group 7 INR", Statement::Group { id: 7, currency: "INR" })]
    #[case::group_upper("GROUP 7 usd", Statement::Group { id: 7, currency: "usd" })]
    #[case::member("member <@1> Asha", Statement::Member { id: 1, name: "Asha" })]
    #[case::member_spaces(
        "member <@2> Bilal Q  // roommate",
        Statement::Member { id: 2, name: "Bilal Q" }
    )]
    #[case::member_slash("member <@3> A/B", Statement::Member { id: 3, name: "A/B" })]
    #[case::member_slash_comment(
        "member <@4> AC/DC // band",
        Statement::Member { id: 4, name: "AC/DC" }
    )]
    #[case::member_comment_glued(
        "member <@5> Dara// cousin",
        Statement::Member { id: 5, name: "Dara" }
    )]
    #[case::undo("!undo 2", Statement::Command(Command::Undo(2)))]
    #[case::balances("!balances", Statement::Command(Command::Balances))]
    #[case::simplify("  !simplify  ", Statement::Command(Command::Simplify))]
    #[case::settleup("!SettleUp // all of it", Statement::Command(Command::SettleUp))]
    fn parses_statements(#[case] input: &str, #[case] expected: Statement<'_>) {
        assert_eq!(parse_one(input), expected);
    }

    #[rstest]
    #[case::equal(
        "<@1> paid 300 for <@1> <@2> <@3>",
        ExpenseLine { payer: 1, amount: 300, split: SplitSpec::Equal(vec![1, 2, 3]) }
    )]
    #[case::exact(
        "<@2> paid 150 for <@1>=50 <@2>=50 <@3>=50 // dinner",
        ExpenseLine {
            payer: 2,
            amount: 150,
            split: SplitSpec::Exact(vec![(1, 50), (2, 50), (3, 50)]),
        }
    )]
    #[case::shares(
        "<@3> paid 90 shares <@1>=1 <@2>=2",
        ExpenseLine { payer: 3, amount: 90, split: SplitSpec::Shares(vec![(1, 1), (2, 2)]) }
    )]
    #[case::negative_amount(
        "<@1> paid -40 for <@2>",
        ExpenseLine { payer: 1, amount: -40, split: SplitSpec::Equal(vec![2]) }
    )]
    fn parses_expenses(#[case] input: &str, #[case] expected: ExpenseLine) {
        assert_eq!(parse_one(input), Statement::Expense(expected));
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let script = parse_script("// header\n\ngroup 1 INR\n   \n// trailing\n!balances")
            .expect("script should parse");
        let lines: Vec<usize> = script.statements.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 6]);
    }

    #[rstest]
    #[case::mixed_split("group 1 INR\n<@1> paid 100 for <@1>=50 <@2>", 2)]
    #[case::missing_split("<@1> paid 100", 1)]
    #[case::unknown_command("group 1 INR\nmember <@1> A\n!explode", 3)]
    #[case::trailing_garbage("!balances now", 1)]
    #[case::fractional_amount("<@1> paid 10.5 for <@2>", 1)]
    fn reports_the_failing_line(#[case] input: &str, #[case] expected_line: usize) {
        match parse_script(input) {
            Err(ParseError::SyntaxError { line, .. }) => assert_eq!(line, expected_line),
            Ok(script) => panic!("expected a syntax error, got {script:?}"),
        }
    }
}
